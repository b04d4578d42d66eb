use scraper::ElementRef;

/// Every text fragment trimmed (non-breaking spaces included), then glued together.
pub fn extract_cell_text(node: ElementRef) -> String {
    node.text().map(str::trim).collect::<String>()
}
