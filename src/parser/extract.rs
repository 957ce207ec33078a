use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};

use crate::model::{ModelRecord, CAPTURED_AT_FORMAT, SENTINEL};

// Catalog cards are anchors carrying exactly this class string.
static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"a[class="group w-full"]"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div[title]").unwrap());
static PULLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span[x-test-pull-count]").unwrap());
static SIZE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span[x-test-size]").unwrap());
static CAPABILITY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span[x-test-capability]").unwrap());
static UPDATED: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span[x-test-updated]").unwrap());

pub fn extract(document: &Html) -> Vec<ModelRecord> {
    extract_with(document, || Local::now().naive_local())
}

/// Walk every catalog card in document order. `now` is called once per
/// emitted record, so each record carries its own capture moment.
pub fn extract_with<F>(document: &Html, mut now: F) -> Vec<ModelRecord>
where
    F: FnMut() -> NaiveDateTime,
{
    document
        .select(&CARD)
        .filter_map(|card| {
            // No titled div → not a model card we can name; skip it.
            let name = card
                .select(&TITLE)
                .next()
                .and_then(|el| el.value().attr("title"))?
                .to_string();

            let pulls = first_text(card, &PULLS).unwrap_or_else(|| SENTINEL.to_string());
            let sizes = all_texts(card, &SIZE);
            let capability = match all_texts(card, &CAPABILITY) {
                tags if tags.is_empty() => vec![SENTINEL.to_string()],
                tags => tags,
            };
            let updated = first_text(card, &UPDATED).unwrap_or_else(|| SENTINEL.to_string());

            Some(ModelRecord {
                name,
                pulls,
                sizes,
                capability,
                updated,
                captured_at: now().format(CAPTURED_AT_FORMAT).to_string(),
            })
        })
        .collect()
}

fn first_text(card: ElementRef, selector: &Selector) -> Option<String> {
    card.select(selector).next().map(text_of)
}

fn all_texts(card: ElementRef, selector: &Selector) -> Vec<String> {
    card.select(selector).map(text_of).collect()
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TWO_CARDS: &str = r#"
        <html>
            <body>
                <a class="group w-full">
                    <div title="llama2">llama2</div>
                    <span x-test-pull-count="true">1.2M</span>
                    <span x-test-size="true">7B</span>
                    <span x-test-size="true">13B</span>
                    <span x-test-capability="true">text</span>
                    <span x-test-updated="true">2 days ago</span>
                </a>
                <a class="group w-full">
                    <div title="codellama">codellama</div>
                    <span x-test-pull-count="true">800K</span>
                    <span x-test-size="true">7B</span>
                    <span x-test-capability="true">code</span>
                    <span x-test-updated="true">1 week ago</span>
                </a>
            </body>
        </html>
    "#;

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn run(html: &str) -> Vec<ModelRecord> {
        extract_with(&Html::parse_document(html), fixed_clock)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_cards_full_fields() {
        let records = run(TWO_CARDS);
        assert_eq!(records.len(), 2);

        let llama = &records[0];
        assert_eq!(llama.name, "llama2");
        assert_eq!(llama.pulls, "1.2M");
        assert_eq!(llama.sizes, strings(&["7B", "13B"]));
        assert_eq!(llama.capability, strings(&["text"]));
        assert_eq!(llama.updated, "2 days ago");
        assert_eq!(llama.captured_at, "2024-01-15 10:30:00");

        let code = &records[1];
        assert_eq!(code.name, "codellama");
        assert_eq!(code.pulls, "800K");
        assert_eq!(code.sizes, strings(&["7B"]));
        assert_eq!(code.capability, strings(&["code"]));
        assert_eq!(code.updated, "1 week ago");
    }

    #[test]
    fn name_only_card_gets_sentinels() {
        let records = run(r#"<a class="group w-full"><div title="testmodel">testmodel</div><!-- nothing else --></a>"#);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "testmodel");
        assert_eq!(r.pulls, "N/A");
        assert!(r.sizes.is_empty());
        assert_eq!(r.capability, strings(&["N/A"]));
        assert_eq!(r.updated, "N/A");
    }

    #[test]
    fn card_without_title_is_skipped() {
        let html = r#"
            <a class="group w-full"><span x-test-pull-count>5M</span></a>
            <a class="group w-full"><div>untitled</div><span x-test-size>7B</span></a>
            <a class="group w-full"><div title="kept">kept</div></a>
        "#;
        let records = run(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "kept");
    }

    #[test]
    fn document_order_is_kept() {
        let html = r#"
            <a class="group w-full"><div title="b-model"></div></a>
            <a class="group w-full"><div title="a-model"></div></a>
        "#;
        let names: Vec<String> = run(html).into_iter().map(|r| r.name).collect();
        assert_eq!(names, strings(&["b-model", "a-model"]));
    }

    #[test]
    fn other_anchors_are_ignored() {
        let html = r#"
            <a class="group"><div title="nope"></div></a>
            <a class="w-full group-hover"><div title="nope2"></div></a>
            <div class="group w-full"><div title="nope3"></div></div>
            <a class="group w-full"><div title="yes"></div></a>
        "#;
        let records = run(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "yes");
    }

    #[test]
    fn text_is_trimmed_and_nested_text_joined() {
        let html = r#"
            <a class="group w-full">
                <div title="qwen"></div>
                <span x-test-pull-count>
                    <b>3.4</b>M
                </span>
                <span x-test-size>  0.5b </span>
                <span x-test-updated>
                    3 weeks ago
                </span>
            </a>
        "#;
        let r = &run(html)[0];
        assert_eq!(r.pulls, "3.4M");
        assert_eq!(r.sizes, strings(&["0.5b"]));
        assert_eq!(r.updated, "3 weeks ago");
    }

    #[test]
    fn title_attribute_taken_verbatim() {
        let html = r#"<a class="group w-full"><div title="deepseek-r1 &amp; co">shown text</div></a>"#;
        assert_eq!(run(html)[0].name, "deepseek-r1 & co");
    }

    #[test]
    fn empty_or_garbage_markup_yields_nothing() {
        assert!(run("").is_empty());
        assert!(run("<html><body><p>maintenance</p></body></html>").is_empty());
        assert!(run("<<<a class=>>></div").is_empty());
    }

    #[test]
    fn clock_is_read_per_record() {
        let mut tick = 0u32;
        let clock = || {
            tick += 1;
            fixed_clock() + chrono::Duration::seconds(tick as i64)
        };
        let records = extract_with(&Html::parse_document(TWO_CARDS), clock);
        assert_eq!(records[0].captured_at, "2024-01-15 10:30:01");
        assert_eq!(records[1].captured_at, "2024-01-15 10:30:02");
    }

    #[test]
    fn skipped_cards_do_not_read_the_clock() {
        let html = r#"
            <a class="group w-full"><span>no title</span></a>
            <a class="group w-full"><div title="only"></div></a>
        "#;
        let mut calls = 0;
        let records = extract_with(&Html::parse_document(html), || {
            calls += 1;
            fixed_clock()
        });
        assert_eq!(records.len(), 1);
        assert_eq!(calls, 1);
    }
}
