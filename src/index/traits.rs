use crate::index::ParsedIndex;

pub trait IndexParser: Send + Sync {
    fn id(&self) -> &'static str;
    /// Parses raw index text. Never fails as a whole: malformed records are
    /// skipped and reported through `ParsedIndex::warnings`.
    fn parse(&self, content: &str) -> ParsedIndex;
}
