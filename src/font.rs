use crate::types::Pt;

// Advance widths (1/1000 em) for printable ASCII 32..=126, from the base-14 AFM files.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722,
    722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556,
    556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722,
    722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611,
    611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556,
    500, 389, 280, 389, 584,
];

const MISSING_WIDTH: u16 = 556;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseFont {
    Helvetica,
    HelveticaBold,
}

impl BaseFont {
    /// Maps an authored font name (e.g. `Arial-BoldMT`, `Helvetica`) onto the
    /// base-14 face used in the overlay.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
            BaseFont::HelveticaBold
        } else {
            BaseFont::Helvetica
        }
    }

    pub fn pdf_name(&self) -> &'static str {
        match self {
            BaseFont::Helvetica => "Helvetica",
            BaseFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub fn resource_name(&self) -> &'static str {
        match self {
            BaseFont::Helvetica => "F1",
            BaseFont::HelveticaBold => "F2",
        }
    }

    fn advance(&self, ch: char) -> u16 {
        let table = match self {
            BaseFont::Helvetica => &HELVETICA_WIDTHS,
            BaseFont::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        let code = ch as u32;
        if (32..=126).contains(&code) {
            table[(code - 32) as usize]
        } else {
            MISSING_WIDTH
        }
    }
}

pub fn measure_text_width(font_name: &str, font_size: Pt, text: &str) -> Pt {
    let face = BaseFont::from_name(font_name);
    let units: i32 = text.chars().map(|ch| face.advance(ch) as i32).sum();
    if units <= 0 {
        return Pt::ZERO;
    }
    font_size.mul_ratio(units, 1000)
}

/// Greedy word wrap limited to `max_lines`; words that do not fit on the last
/// line are appended to it rather than dropped.
pub fn wrap_words(
    font_name: &str,
    font_size: Pt,
    text: &str,
    max_width: Pt,
    max_lines: usize,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        let fits = measure_text_width(font_name, font_size, &candidate) <= max_width;
        if fits || lines.len() + 1 >= max_lines {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_helvetica_digits() {
        let width = measure_text_width("Helvetica", Pt::from_f32(10.0), "100");
        assert_eq!(width.to_milli_i64(), 16680);
    }

    #[test]
    fn bold_names_map_to_bold_face() {
        assert_eq!(BaseFont::from_name("Arial-BoldMT"), BaseFont::HelveticaBold);
        assert_eq!(BaseFont::from_name("ArialMT"), BaseFont::Helvetica);
    }

    #[test]
    fn wrap_caps_line_count() {
        let lines = wrap_words(
            "Helvetica",
            Pt::from_f32(8.0),
            "Battery storage system installation",
            Pt::from_f32(40.0),
            2,
        );
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Battery");
        assert_eq!(lines[1], "storage system installation");
    }
}
