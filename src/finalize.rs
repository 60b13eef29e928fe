use crate::error::{DiagnosticKind, Diagnostics, OfferStampError};
use crate::types::Rect;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};

/// Page-1 (or configured page) graphic drawn between background and overlay.
#[derive(Debug, Clone)]
pub struct SecondaryGraphic {
    pub page: usize,
    pub rect: Rect,
    pub pdf: Vec<u8>,
}

/// Everything needed to build the final document.
pub struct ComposeInput {
    pub overlay: LoDocument,
    /// One background PDF per overlay page.
    pub backgrounds: Vec<Vec<u8>>,
    pub secondary: Option<SecondaryGraphic>,
    pub appended: Option<LoDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSummary {
    pub pages_written: usize,
    pub appended_pages: usize,
    pub overlay_only_pages: Vec<usize>,
}

const DEFAULT_BOX: [f32; 4] = [0.0, 0.0, 595.28, 841.89];

/// Looks up a page attribute, following the `Parent` chain for inherited ones.
fn inherited<'a>(doc: &'a LoDocument, page: &'a lopdf::Dictionary, key: &[u8]) -> Option<&'a LoObject> {
    let mut current = page;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        current = doc.get_object(parent).and_then(LoObject::as_dict).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> &'a LoObject {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v),
        _ => None,
    }
}

fn page_box(doc: &LoDocument, page: &lopdf::Dictionary) -> [f32; 4] {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        let Some(obj) = inherited(doc, page, key) else {
            continue;
        };
        let Ok(arr) = resolve(doc, obj).as_array() else {
            continue;
        };
        let values: Vec<f32> = arr.iter().filter_map(|v| number(resolve(doc, v))).collect();
        if let [x0, y0, x1, y1] = values.as_slice() {
            return [x0.min(*x1), y0.min(*y1), x0.max(*x1), y0.max(*y1)];
        }
    }
    DEFAULT_BOX
}

fn box_object(b: [f32; 4]) -> LoObject {
    LoObject::Array(b.iter().map(|v| LoObject::Real(*v)).collect())
}

fn page_resources_object(doc: &LoDocument, page: &lopdf::Dictionary) -> LoObject {
    match inherited(doc, page, b"Resources").map(|obj| resolve(doc, obj)) {
        Some(LoObject::Dictionary(d)) => LoObject::Dictionary(d.clone()),
        _ => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

/// Moves every object of `src` into `dst` and returns `src`'s page ids in order.
fn import_document_objects(
    dst: &mut LoDocument,
    mut src: LoDocument,
    what: &str,
) -> Result<Vec<LoObjectId>, OfferStampError> {
    if src.is_encrypted() {
        return Err(OfferStampError::Merge(format!("{what} is encrypted")));
    }
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let page_ids: Vec<LoObjectId> = src.get_pages().values().copied().collect();
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    Ok(page_ids)
}

/// Wraps an imported page as a Form XObject; returns the form id and its box.
fn page_as_form(
    doc: &mut LoDocument,
    page_id: LoObjectId,
) -> Result<(LoObjectId, [f32; 4]), OfferStampError> {
    let page = doc.get_object(page_id).and_then(LoObject::as_dict)?.clone();
    let content = doc.get_page_content(page_id)?;
    let bbox = page_box(doc, &page);
    let resources = page_resources_object(doc, &page);
    let form_id = doc.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => box_object(bbox),
            "Resources" => resources,
        },
        content,
    ));
    Ok((form_id, bbox))
}

fn load_first_page(doc: &mut LoDocument, bytes: &[u8], what: &str) -> Result<(LoObjectId, [f32; 4]), OfferStampError> {
    let src = LoDocument::load_mem(bytes)
        .map_err(|err| OfferStampError::Merge(format!("{what} is not a readable PDF: {err}")))?;
    let pages = import_document_objects(doc, src, what)?;
    let first = pages
        .first()
        .copied()
        .ok_or_else(|| OfferStampError::Merge(format!("{what} has no pages")))?;
    page_as_form(doc, first)
}

/// `cm` operands that fit a form with box `src` into `target` (top-left page
/// space), preserving aspect ratio and centering.
pub fn fit_matrix(src: [f32; 4], target: Rect, page_height: f32) -> [f32; 6] {
    let gw = (src[2] - src[0]).max(f32::EPSILON);
    let gh = (src[3] - src[1]).max(f32::EPSILON);
    let tw = target.width.to_f32();
    let th = target.height.to_f32();
    let scale = (tw / gw).min(th / gh);
    let w = gw * scale;
    let h = gh * scale;
    let left = target.x.to_f32() + (tw - w) / 2.0;
    let top = target.y.to_f32() + (th - h) / 2.0;
    let bottom = page_height - top - h;
    [scale, 0.0, 0.0, scale, left - src[0] * scale, bottom - src[1] * scale]
}

fn fmt_matrix(m: [f32; 6]) -> String {
    m.iter()
        .map(|v| format!("{:.4}", v).trim_end_matches('0').trim_end_matches('.').to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merges backgrounds, the secondary graphic and overlay pages, appends the
/// supplementary document and serializes the result.
pub fn compose_document(
    input: ComposeInput,
    diagnostics: &mut Diagnostics,
) -> Result<(Vec<u8>, ComposeSummary), OfferStampError> {
    let ComposeInput {
        overlay,
        backgrounds,
        secondary,
        appended,
    } = input;

    let mut composed = LoDocument::with_version("1.7");
    let overlay_pages = import_document_objects(&mut composed, overlay, "overlay")?;
    if overlay_pages.len() != backgrounds.len() {
        return Err(OfferStampError::Unexpected(format!(
            "overlay has {} pages but {} background slots were prepared",
            overlay_pages.len(),
            backgrounds.len()
        )));
    }

    let secondary_form = match &secondary {
        Some(graphic) => match load_first_page(&mut composed, &graphic.pdf, "secondary graphic") {
            Ok((form, bbox)) => Some((graphic.page, graphic.rect, form, bbox)),
            Err(err) => {
                diagnostics.report(DiagnosticKind::Merge, Some(graphic.page), err.to_string());
                None
            }
        },
        None => None,
    };

    let pages_id = composed.new_object_id();
    let mut kids: Vec<LoObject> = Vec::new();
    let mut overlay_only_pages = Vec::new();

    for (idx, (overlay_page_id, background)) in overlay_pages.iter().zip(backgrounds).enumerate() {
        let page_number = idx + 1;
        let (overlay_form, overlay_box) = page_as_form(&mut composed, *overlay_page_id)?;
        let mut xobjects = lopdf::Dictionary::new();
        let mut content = String::new();
        let mut media_box = overlay_box;

        let what = format!("background for page {page_number}");
        let background_form = match load_first_page(&mut composed, &background, &what) {
            Ok(loaded) => Some(loaded),
            Err(err) => {
                diagnostics.report(
                    DiagnosticKind::Merge,
                    Some(page_number),
                    format!("{err}; rendering overlay only"),
                );
                None
            }
        };
        match background_form {
            Some((form, bbox)) => {
                media_box = bbox;
                xobjects.set("OS_BG", form);
                content.push_str("q /OS_BG Do Q\n");
            }
            None => overlay_only_pages.push(page_number),
        }

        if let Some((page, rect, form, bbox)) = &secondary_form {
            if *page == page_number {
                let page_height = media_box[3] - media_box[1];
                xobjects.set("OS_SEC", *form);
                content.push_str(&format!(
                    "q {} cm /OS_SEC Do Q\n",
                    fmt_matrix(fit_matrix(*bbox, *rect, page_height))
                ));
            }
        }

        xobjects.set("OS_OVL", overlay_form);
        content.push_str("q /OS_OVL Do Q\n");
        kids.push(add_page(&mut composed, pages_id, media_box, xobjects, content).into());
    }

    let mut appended_pages = 0usize;
    if let Some(extra) = appended {
        for page_id in import_document_objects(&mut composed, extra, "appended document")? {
            let (form, bbox) = page_as_form(&mut composed, page_id)?;
            let mut xobjects = lopdf::Dictionary::new();
            xobjects.set("OS_APP", form);
            let content = "q /OS_APP Do Q\n".to_string();
            kids.push(add_page(&mut composed, pages_id, bbox, xobjects, content).into());
            appended_pages += 1;
        }
    }

    let pages_written = kids.len();
    composed.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages_written as i64,
        }),
    );
    let catalog_id = composed.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    composed.trailer.set("Root", catalog_id);
    composed.prune_objects();
    composed.renumber_objects();
    composed.compress();

    let mut bytes = Vec::new();
    composed
        .save_to(&mut bytes)
        .map_err(|err| OfferStampError::Merge(format!("serializing output failed: {err}")))?;

    Ok((
        bytes,
        ComposeSummary {
            pages_written,
            appended_pages,
            overlay_only_pages,
        },
    ))
}

fn add_page(
    doc: &mut LoDocument,
    pages_id: LoObjectId,
    media_box: [f32; 4],
    xobjects: lopdf::Dictionary,
    content: String,
) -> LoObjectId {
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => xobjects,
        },
        "MediaBox" => box_object(media_box),
    })
}

/// Page count of a PDF held in memory; unreadable input is `Malformed`.
pub fn load_appended(bytes: &[u8]) -> Result<(LoDocument, usize), OfferStampError> {
    let doc = LoDocument::load_mem(bytes)
        .map_err(|err| OfferStampError::Malformed(format!("appended document unreadable: {err}")))?;
    if doc.is_encrypted() {
        return Err(OfferStampError::Malformed(
            "appended document is encrypted".to_string(),
        ));
    }
    let pages = doc.get_pages().len();
    Ok((doc, pages))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::pdf::{ImageStore, overlay_to_lopdf};
    use crate::types::{Pt, Size};

    pub(crate) fn make_single_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save");
        bytes
    }

    fn overlay(pages: usize) -> LoDocument {
        let mut canvas = Canvas::new(Size::new(612.0, 792.0));
        for page in 0..pages {
            canvas.draw_string(Pt::from_i32(50), Pt::from_i32(50), format!("overlay {}", page + 1));
            canvas.show_page();
        }
        overlay_to_lopdf(&canvas.finish_without_show(), &ImageStore::new()).expect("overlay")
    }

    fn page_text(doc: &LoDocument, page: u32) -> String {
        let pages = doc.get_pages();
        let id = pages.get(&page).copied().expect("page");
        let page_dict = doc.get_object(id).and_then(LoObject::as_dict).expect("dict");
        let resources = page_resources_object(doc, page_dict);
        let mut out = String::from_utf8_lossy(&doc.get_page_content(id).expect("content")).into_owned();
        if let LoObject::Dictionary(res) = resources {
            if let Ok(LoObject::Dictionary(xobjects)) = res.get(b"XObject") {
                for (_, form) in xobjects.iter() {
                    let Ok(form_id) = form.as_reference() else { continue };
                    if let Ok(LoObject::Stream(stream)) = doc.get_object(form_id) {
                        let body = stream
                            .decompressed_content()
                            .unwrap_or_else(|_| stream.content.clone());
                        out.push_str(&String::from_utf8_lossy(&body));
                    }
                }
            }
        }
        out
    }

    #[test]
    fn background_and_overlay_share_a_page() {
        let input = ComposeInput {
            overlay: overlay(2),
            backgrounds: vec![
                make_single_page_pdf("background one"),
                make_single_page_pdf("background two"),
            ],
            secondary: None,
            appended: None,
        };
        let mut diagnostics = Diagnostics::default();
        let (bytes, summary) = compose_document(input, &mut diagnostics).expect("compose");
        assert_eq!(summary.pages_written, 2);
        assert!(summary.overlay_only_pages.is_empty());
        let doc = LoDocument::load_mem(&bytes).expect("reload");
        assert_eq!(doc.get_pages().len(), 2);
        let text = page_text(&doc, 2);
        assert!(text.contains("background two"));
        assert!(text.contains("overlay 2"));
    }

    #[test]
    fn unreadable_background_falls_back_to_overlay_only() {
        let input = ComposeInput {
            overlay: overlay(2),
            backgrounds: vec![make_single_page_pdf("ok"), b"not a pdf".to_vec()],
            secondary: None,
            appended: None,
        };
        let mut diagnostics = Diagnostics::default();
        let (bytes, summary) = compose_document(input, &mut diagnostics).expect("compose");
        assert_eq!(summary.overlay_only_pages, vec![2]);
        assert_eq!(diagnostics.entries()[0].kind, DiagnosticKind::Merge);
        assert_eq!(diagnostics.entries()[0].page, Some(2));
        let doc = LoDocument::load_mem(&bytes).expect("reload");
        assert!(page_text(&doc, 2).contains("overlay 2"));
    }

    #[test]
    fn appended_pages_follow_rendered_pages() {
        let (extra, count) = load_appended(&make_single_page_pdf("appendix")).expect("appended");
        assert_eq!(count, 1);
        let input = ComposeInput {
            overlay: overlay(1),
            backgrounds: vec![make_single_page_pdf("bg")],
            secondary: Some(SecondaryGraphic {
                page: 1,
                rect: Rect::new(100.0, 100.0, 200.0, 100.0),
                pdf: make_single_page_pdf("chart"),
            }),
            appended: Some(extra),
        };
        let mut diagnostics = Diagnostics::default();
        let (bytes, summary) = compose_document(input, &mut diagnostics).expect("compose");
        assert_eq!(summary.pages_written, 2);
        assert_eq!(summary.appended_pages, 1);
        let doc = LoDocument::load_mem(&bytes).expect("reload");
        assert!(page_text(&doc, 1).contains("chart"));
        assert!(page_text(&doc, 2).contains("appendix"));
        assert!(diagnostics.entries().is_empty());
    }

    #[test]
    fn unreadable_appended_document_is_malformed() {
        assert!(matches!(
            load_appended(b"%PDF-garbage"),
            Err(OfferStampError::Malformed(_))
        ));
    }

    #[test]
    fn fit_matrix_centers_and_scales() {
        let m = fit_matrix([0.0, 0.0, 612.0, 792.0], Rect::new(0.0, 0.0, 306.0, 792.0), 792.0);
        assert!((m[0] - 0.5).abs() < 1e-6);
        assert!((m[4] - 0.0).abs() < 1e-3);
        assert!((m[5] - 198.0).abs() < 1e-3);
    }

    #[test]
    fn inherited_media_box_is_found() {
        let doc = LoDocument::load_mem(&make_single_page_pdf("x")).expect("load");
        let id = doc.get_pages().get(&1).copied().expect("page");
        let page = doc.get_object(id).and_then(LoObject::as_dict).expect("dict");
        assert_eq!(page_box(&doc, page), [0.0, 0.0, 612.0, 792.0]);
    }
}
