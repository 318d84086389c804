/// Appended to the last page when the text did not fit into `max_pages`.
pub const TRUNCATION_MARKER: &str = "\n… (truncated)";

/// Split `text` into pages of at most `page_chars` characters.
///
/// Pages break on line boundaries where possible; a single line longer than a
/// page is cut on char boundaries. At most `max_pages` pages are returned.
pub fn split_pages(text: &str, page_chars: usize, max_pages: usize) -> Vec<String> {
    let page_chars = page_chars.max(1);
    let max_pages = max_pages.max(1);

    let mut pages: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= page_chars {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut chars = line.chars();
        loop {
            let chunk: String = chars.by_ref().take(page_chars).collect();
            if chunk.is_empty() {
                break;
            }
            let chunk_len = chunk.chars().count();
            if chunk_len == page_chars {
                pages.push(chunk);
            } else {
                current_len = chunk_len;
                current = chunk;
                break;
            }
        }
    }
    if !current.is_empty() {
        pages.push(current);
    }

    let mut pages: Vec<String> = pages
        .into_iter()
        .map(|p| p.trim_end_matches('\n').to_string())
        .filter(|p| !p.trim().is_empty())
        .collect();

    if pages.len() > max_pages {
        pages.truncate(max_pages);
        if let Some(last) = pages.last_mut() {
            let keep = page_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
            if last.chars().count() > keep {
                *last = last.chars().take(keep).collect();
            }
            last.push_str(TRUNCATION_MARKER);
        }
    }

    if pages.is_empty() {
        pages.push(text.trim().to_string());
    }
    pages
}
