pub mod extract;

use scraper::Html;

use crate::model::ModelRecord;

/// Raw page → parsed tree → catalog records.
pub fn process_page(html: &str) -> Vec<ModelRecord> {
    let document = Html::parse_document(html);
    extract::extract(&document)
}
