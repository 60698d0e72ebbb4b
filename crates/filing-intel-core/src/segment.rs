//! Heading-driven segmentation of filing text.
//!
//! [`segment`] scans the text line by line. A heading line closes the
//! current segment and opens a new one labeled with the heading text.
//! Recognized headings:
//!
//! - markdown-style lines starting with `#` (label is the text after the
//!   hashes)
//! - `Section …` / `SECTION …`
//! - filing items such as `ITEM 1.`, `Item 7A.`
//! - filing parts such as `PART II`
//!
//! Lines before the first heading go to a segment labeled `unknown`.
//! Headings without body text produce no segment of their own; if the
//! whole input is headings, one segment holds the heading lines under the
//! last heading's label.
//! When no heading appears anywhere, the text is cut into three
//! contiguous slices by character offset with fixed generic labels.
//!
//! The input is expected to be normalized with
//! [`NormalizeProfile::Lines`](crate::normalize::NormalizeProfile::Lines).

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Segment;

pub const UNKNOWN_SECTION: &str = "unknown";

/// Labels used by the proportional fallback, in order.
pub const FALLBACK_LABELS: [&str; 3] = ["part_1_business", "part_2_financials", "part_3_legal"];

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)
        ^(?:
            (?:Section|SECTION)\b
          | (?i:ITEM)\s+\d+[A-Za-z]?\.
          | (?i:PART)\s+[IVX]+\b
        )")
    .expect("heading regex")
});

/// Returns the heading label for `line`, or `None` if it is body text.
pub fn heading_label(line: &str) -> Option<String> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('#') {
        let rest = rest.trim_start_matches('#').trim();
        return (!rest.is_empty()).then(|| rest.to_string());
    }
    if HEADING.is_match(line) {
        return Some(line.to_string());
    }
    None
}

pub fn segment(text: &str) -> Vec<Segment> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut label = UNKNOWN_SECTION.to_string();
    let mut body: Vec<&str> = Vec::new();
    let mut heading_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(heading) = heading_label(line) {
            heading_lines.push(line.trim());
            push_segment(&mut segments, &label, &body);
            label = heading;
            body.clear();
            continue;
        }
        let line = line.trim();
        if !line.is_empty() {
            body.push(line);
        }
    }
    push_segment(&mut segments, &label, &body);

    if heading_lines.is_empty() {
        return proportional_split(text);
    }
    // Headings with no body anywhere: keep the heading text itself.
    if segments.is_empty() {
        push_segment(&mut segments, &label, &heading_lines);
    }
    segments
}

fn push_segment(out: &mut Vec<Segment>, label: &str, body: &[&str]) {
    if body.is_empty() {
        return;
    }
    out.push(Segment {
        section_type: label.to_string(),
        text: body.join("\n"),
        start_page: 0,
        end_page: 0,
    });
}

/// Cut `text` into thirds by character count. The last slice absorbs the
/// remainder. Whitespace-only slices are dropped.
pub fn proportional_split(text: &str) -> Vec<Segment> {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = offsets.len() - 1;
    let size = n / 3;
    let bounds = [(0, size), (size, 2 * size), (2 * size, n)];

    bounds
        .iter()
        .zip(FALLBACK_LABELS)
        .filter_map(|(&(start, end), label)| {
            let slice = &text[offsets[start]..offsets[end]];
            if slice.trim().is_empty() {
                return None;
            }
            Some(Segment {
                section_type: label.to_string(),
                text: slice.to_string(),
                start_page: 0,
                end_page: 0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_headings_split_sections() {
        let text = "ITEM 1. BUSINESS\nWe design and sell widgets.\nITEM 1A. RISK FACTORS\nSupply chains may fail.";
        let segs = segment(text);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].section_type, "ITEM 1. BUSINESS");
        assert_eq!(segs[0].text, "We design and sell widgets.");
        assert_eq!(segs[1].section_type, "ITEM 1A. RISK FACTORS");
        assert_eq!(segs[1].text, "Supply chains may fail.");
        for s in &segs {
            assert!(!s.text.contains("ITEM"));
        }
    }

    #[test]
    fn preamble_goes_to_unknown() {
        let text = "ACME CORP ANNUAL REPORT\n# Overview\nStrong year.";
        let segs = segment(text);
        assert_eq!(segs[0].section_type, UNKNOWN_SECTION);
        assert_eq!(segs[0].text, "ACME CORP ANNUAL REPORT");
        assert_eq!(segs[1].section_type, "Overview");
        assert_eq!(segs[1].text, "Strong year.");
    }

    #[test]
    fn heading_only_sections_are_dropped() {
        let text = "PART I\nITEM 1. BUSINESS\nWidgets.\nSECTION 9\n\n";
        let segs = segment(text);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].section_type, "ITEM 1. BUSINESS");
    }

    #[test]
    fn heading_only_input_keeps_heading_text() {
        let segs = segment("ITEM 1. BUSINESS");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].section_type, "ITEM 1. BUSINESS");
        assert_eq!(segs[0].text, "ITEM 1. BUSINESS");

        let segs = segment("PART I\nITEM 7. MD&A\n");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].section_type, "ITEM 7. MD&A");
        assert_eq!(segs[0].text, "PART I\nITEM 7. MD&A");
    }

    #[test]
    fn bare_hash_lines_are_body_text() {
        assert!(heading_label("#").is_none());
        assert!(heading_label("##   ").is_none());

        let segs = segment("# Overview\n#\nbody");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].section_type, "Overview");
        assert_eq!(segs[0].text, "#\nbody");
    }

    #[test]
    fn headings_are_recognized() {
        assert!(heading_label("Item 7A. Quantitative Disclosures").is_some());
        assert!(heading_label("PART II").is_some());
        assert!(heading_label("Section 3 Liquidity").is_some());
        assert_eq!(heading_label("## Results").as_deref(), Some("Results"));
        assert!(heading_label("Items were shipped.").is_none());
        assert!(heading_label("Partners joined.").is_none());
        assert!(heading_label("section of text").is_none());
    }

    #[test]
    fn no_headings_falls_back_to_thirds() {
        let text: String = ('a'..='j').cycle().take(300).collect();
        let segs = segment(&text);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].text, &text[0..100]);
        assert_eq!(segs[1].text, &text[100..200]);
        assert_eq!(segs[2].text, &text[200..300]);
        let labels: Vec<_> = segs.iter().map(|s| s.section_type.as_str()).collect();
        assert_eq!(labels, FALLBACK_LABELS);
    }

    #[test]
    fn fallback_handles_multibyte_and_short_text() {
        let segs = segment("€€€€");
        let joined: String = segs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, "€€€€");

        let segs = segment("ab");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].section_type, "part_3_legal");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment("").is_empty());
        assert!(segment(" \n ").is_empty());
    }

    #[test]
    fn body_lines_appear_exactly_once() {
        let text = "intro line\nITEM 2. PROPERTIES\nHQ in Austin.\nPlant in Ohio.\nITEM 3. LEGAL\nNone.";
        let segs = segment(text);
        let body: Vec<&str> = segs.iter().flat_map(|s| s.text.lines()).collect();
        assert_eq!(
            body,
            vec!["intro line", "HQ in Austin.", "Plant in Ohio.", "None."]
        );
    }
}
