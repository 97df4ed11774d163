//! Storage escaping for metadata documents.

/// Make a JSON document safe for TEXT-column storage.
///
/// Strips `\u0000` escape sequences and literal NUL characters, which
/// SQLite TEXT handling and downstream JSON consumers reject.
pub fn escape(document: &str) -> String {
    document.replace("\\u0000", "").replace('\u{0000}', "")
}
