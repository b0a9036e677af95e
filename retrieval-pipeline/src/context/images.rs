use std::sync::OnceLock;

use common::model::ImageInfo;
use regex::Regex;

/// `![alt](url)` with the URL in group 2.
fn image_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("image link pattern"))
}

/// Weave image metadata into a passage.
///
/// Every markdown image link whose URL matches an `ImageInfo` entry (by `url`
/// or `original_url`) gets description/OCR lines inserted right after the
/// link. Entries never referenced from the content are appended under a
/// trailing "Additional image information" block.
pub fn enrich_passage(content: &str, image_info: &[ImageInfo]) -> String {
    if image_info.is_empty() {
        return content.to_string();
    }

    let mut used = vec![false; image_info.len()];
    let mut enriched = String::with_capacity(content.len());
    let mut cursor = 0;

    for captures in image_link_regex().captures_iter(content) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let url = captures.get(2).map(|g| g.as_str()).unwrap_or_default();

        enriched.push_str(&content[cursor..whole.end()]);
        cursor = whole.end();

        if let Some(position) = image_info
            .iter()
            .position(|info| info.url == url || info.original_url == url)
        {
            used[position] = true;
            push_annotation(&mut enriched, &image_info[position]);
        }
    }
    enriched.push_str(&content[cursor..]);

    let unreferenced: Vec<&ImageInfo> = image_info
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(info, _)| info)
        .collect();

    if !unreferenced.is_empty() {
        enriched.push_str("\n\nAdditional image information:");
        for info in unreferenced {
            enriched.push('\n');
            enriched.push_str(display_url(info));
            push_annotation(&mut enriched, info);
        }
    }

    enriched
}

fn push_annotation(out: &mut String, info: &ImageInfo) {
    if !info.caption.is_empty() {
        out.push_str("\nImage description: ");
        out.push_str(&info.caption);
    }
    if !info.ocr_text.is_empty() {
        out.push_str("\nImage OCR: ");
        out.push_str(&info.ocr_text);
    }
}

fn display_url(info: &ImageInfo) -> &str {
    if info.url.is_empty() {
        &info.original_url
    } else {
        &info.url
    }
}
