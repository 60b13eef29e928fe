use crate::canvas::{Command, Document, Page};
use crate::error::OfferStampError;
use crate::font::BaseFont;
use crate::types::{Color, Pt};
use base64::Engine;
use fixed::types::I32F32;
use image::GenericImageView;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct ImageData {
    pub width: u32,
    pub height: u32,
    color_space: &'static str,
    filter: Option<&'static str>,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Decoded images of one overlay session, keyed by canvas resource id.
#[derive(Default)]
pub struct ImageStore {
    images: BTreeMap<String, ImageData>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `payload` (base64 or a `data:` URI) and registers it under `id`.
    /// Returns the pixel size. Registering an id twice keeps the first decode.
    pub fn register(&mut self, id: &str, payload: &str) -> Result<(u32, u32), OfferStampError> {
        if let Some(existing) = self.images.get(id) {
            return Ok((existing.width, existing.height));
        }
        let (mime, bytes) = decode_payload(payload)?;
        let image = decode_image_bytes(&bytes, mime.as_deref())?;
        let size = (image.width, image.height);
        self.images.insert(id.to_string(), image);
        Ok(size)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.images.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Splits an optional `data:` header from the base64 body.
pub fn decode_payload(payload: &str) -> Result<(Option<String>, Vec<u8>), OfferStampError> {
    let payload = payload.trim();
    let (mime, body) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let Some((header, body)) = rest.split_once(',') else {
                return Err(OfferStampError::ImageDecode(
                    "data URI without payload".to_string(),
                ));
            };
            let mime = header.split(';').next().unwrap_or_default().to_string();
            (Some(mime), body)
        }
        None => (None, payload),
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| OfferStampError::ImageDecode(format!("invalid base64: {err}")))?;
    Ok((mime, bytes))
}

fn decode_image_bytes(data: &[u8], mime: Option<&str>) -> Result<ImageData, OfferStampError> {
    let format = match mime {
        Some(m) if m.contains("png") => Some(image::ImageFormat::Png),
        Some(m) if m.contains("jpeg") || m.contains("jpg") => Some(image::ImageFormat::Jpeg),
        _ => image::guess_format(data).ok(),
    };
    let decoded = image::load_from_memory(data)
        .map_err(|err| OfferStampError::ImageDecode(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(OfferStampError::ImageDecode("image has no pixels".to_string()));
    }

    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Ok(ImageData {
            width,
            height,
            color_space,
            filter: Some("DCTDecode"),
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    Ok(ImageData {
        width,
        height,
        color_space: "DeviceRGB",
        filter: None,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
    })
}

fn add_image_object(doc: &mut LoDocument, image: &ImageData) -> LoObjectId {
    let smask_id = image.alpha.as_ref().map(|alpha| {
        doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.clone(),
        ))
    });
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
    };
    if let Some(mask) = smask_id {
        dict.set("SMask", mask);
    }
    let stream = match image.filter {
        Some(filter) => {
            dict.set("Filter", filter);
            LoStream::new(dict, image.data.clone()).with_compression(false)
        }
        None => LoStream::new(dict, image.data.clone()),
    };
    doc.add_object(stream)
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let frac = format!("{:03}", frac_part);
    format!("{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn fill_color(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn stroke_color(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

/// Encodes text as a WinAnsi literal string body. Characters outside cp1252
/// become `?`.
fn encode_winansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2122}' => 0x99,
            _ => b'?',
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}

/// Content stream for one overlay page. Canvas space is top-left origin; PDF
/// space is flipped here.
pub(crate) fn render_page(page: &Page, page_height: Pt, image_names: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut font_size = Pt::from_f32(12.0);
    let mut font = BaseFont::Helvetica;
    let flip = |y: Pt| fmt_pt(page_height - y);

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&fill_color(*color)),
            Command::SetStrokeColor(color) => out.push_str(&stroke_color(*color)),
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::SetDash { pattern, phase } => {
                let items = pattern.iter().map(|v| fmt_pt(*v)).collect::<Vec<_>>();
                out.push_str(&format!("[{}] {} d\n", items.join(" "), fmt_pt(*phase)));
            }
            Command::SetFontName(name) => font = BaseFont::from_name(name),
            Command::SetFontSize(size) => font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), flip(*y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), flip(*y)));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_pt(*x1),
                    flip(*y1),
                    fmt_pt(*x2),
                    flip(*y2),
                    fmt_pt(*x),
                    flip(*y),
                ));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", font.resource_name(), fmt_pt(font_size)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encode_winansi(text)));
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let Some(name) = image_names.get(resource_id) else {
                    continue;
                };
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height)
                ));
                out.push_str(&format!("/{} Do\n", name));
                out.push_str("Q\n");
            }
        }
    }
    out
}

fn used_images(page: &Page) -> BTreeSet<&str> {
    page.commands
        .iter()
        .filter_map(|cmd| match cmd {
            Command::DrawImage { resource_id, .. } => Some(resource_id.as_str()),
            _ => None,
        })
        .collect()
}

/// Builds the overlay as an in-memory PDF: one page per canvas page, base-14
/// fonts unembedded, images shared across pages.
pub fn overlay_to_lopdf(document: &Document, images: &ImageStore) -> Result<LoDocument, OfferStampError> {
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let width = document.page_size.width.to_f32();
    let height = document.page_size.height.to_f32();

    let mut fonts = lopdf::Dictionary::new();
    for face in [BaseFont::Helvetica, BaseFont::HelveticaBold] {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => face.pdf_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(face.resource_name(), font_id);
    }

    let mut image_ids: BTreeMap<String, (String, LoObjectId)> = BTreeMap::new();
    for (idx, (resource_id, image)) in images.images.iter().enumerate() {
        let object_id = add_image_object(&mut doc, image);
        image_ids.insert(resource_id.clone(), (format!("Im{}", idx + 1), object_id));
    }
    let image_names: BTreeMap<String, String> = image_ids
        .iter()
        .map(|(id, (name, _))| (id.clone(), name.clone()))
        .collect();

    let mut kids: Vec<LoObject> = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let content = render_page(page, document.page_size.height, &image_names);
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
        let mut xobjects = lopdf::Dictionary::new();
        for resource_id in used_images(page) {
            if let Some((name, object_id)) = image_ids.get(resource_id) {
                xobjects.set(name.as_bytes().to_vec(), *object_id);
            }
        }
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => fonts.clone(),
                "XObject" => xobjects,
            },
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    Ok(doc)
}
