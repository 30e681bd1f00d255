use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::data::models::{CoreError, WordPair};
use crate::data::repositories::CardStore;

const UTF8_BOM: &str = "\u{feff}";
const DELIMITERS: [u8; 3] = [b',', b'\t', b';'];
const DELIMITER_SAMPLE_RECORDS: usize = 20;
const HEADER_WORDS: [&str; 4] = ["word1", "word2", "source", "target"];

/// Rows of an uploaded vocabulary, split into usable pairs and the raw
/// text of every row that was skipped
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedVocabulary {
    pub pairs: Vec<WordPair>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: Vec<String>,
}

fn reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|field| field.is_empty())
}

fn is_header(record: &csv::StringRecord) -> bool {
    let is_header_word =
        |field: Option<&str>| field.is_some_and(|f| HEADER_WORDS.contains(&f.to_lowercase().as_str()));
    record.len() >= 2 && is_header_word(record.get(0)) && is_header_word(record.get(1))
}

/// Scores each candidate by how many of the first records share the most
/// common multi-column width. Comma wins ties.
fn detect_delimiter(text: &str) -> u8 {
    let mut best = (b',', 0);
    for delimiter in DELIMITERS {
        let mut widths: HashMap<usize, usize> = HashMap::new();
        let mut rdr = reader(text, delimiter);
        let sample = rdr
            .records()
            .map_while(Result::ok)
            .filter(|record| !is_blank(record))
            .take(DELIMITER_SAMPLE_RECORDS);
        for record in sample {
            if record.len() >= 2 {
                *widths.entry(record.len()).or_default() += 1;
            }
        }
        let score = widths.values().copied().max().unwrap_or(0);
        if score > best.1 {
            best = (delimiter, score);
        }
    }
    best.0
}

pub fn parse_vocabulary(text: &str) -> Result<ParsedVocabulary, CoreError> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let delimiter = detect_delimiter(text);
    let separator = char::from(delimiter).to_string();

    let mut parsed = ParsedVocabulary::default();
    let mut checked_header = false;

    for record in reader(text, delimiter).records() {
        let record = record.map_err(|e| {
            log::warn!("Unreadable CSV upload: {}", e);
            CoreError::Validation(
                "Failed to read the CSV. Please make sure it is in the word,translation format."
                    .into(),
            )
        })?;
        if is_blank(&record) {
            continue;
        }
        if !checked_header {
            checked_header = true;
            if is_header(&record) {
                continue;
            }
        }

        match (record.len(), record.get(0), record.get(1)) {
            (2 | 3, Some(front), Some(back)) if !front.is_empty() && !back.is_empty() => {
                parsed.pairs.push(WordPair {
                    front: front.to_string(),
                    back: back.to_string(),
                });
            }
            _ => parsed
                .rejected
                .push(record.iter().collect::<Vec<_>>().join(&separator)),
        }
    }
    Ok(parsed)
}

pub fn import_cards(
    store: &dyn CardStore,
    owner_id: i64,
    text: &str,
    now: NaiveDateTime,
) -> Result<ImportReport, CoreError> {
    let parsed = parse_vocabulary(text)?;
    if parsed.pairs.is_empty() {
        return Err(CoreError::Validation(
            "No valid word pairs found to import. Send lines like: word,translation".into(),
        ));
    }

    let (inserted, updated) = store.upsert_pairs(owner_id, &parsed.pairs, now)?;
    log::info!(
        "User {}: imported {} new, {} updated, {} rejected",
        owner_id,
        inserted,
        updated,
        parsed.rejected.len()
    );
    Ok(ImportReport {
        inserted,
        updated,
        rejected: parsed.rejected,
    })
}

/// The owner's cards as a CSV document: BOM, CRLF line ends, sorted by
/// front side. Returns the number of cards alongside the bytes.
pub fn export_cards(store: &dyn CardStore, owner_id: i64) -> Result<(usize, Vec<u8>), CoreError> {
    let mut cards = store.cards(owner_id)?;
    if cards.is_empty() {
        return Err(CoreError::NoCards);
    }
    cards.sort_by(|a, b| a.front.cmp(&b.front).then(a.card_id.cmp(&b.card_id)));

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(UTF8_BOM.as_bytes().to_vec());
    for card in &cards {
        writer.write_record([&card.front, &card.back]).map_err(export_failed)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| export_failed(e.into_error()))?;
    Ok((cards.len(), bytes))
}

fn export_failed(err: impl std::fmt::Display) -> CoreError {
    log::error!("Failed to build CSV export: {}", err);
    CoreError::Validation("Failed to export your vocabulary. Please try again later.".into())
}

pub fn export_filename(now: NaiveDateTime) -> String {
    format!("vocabulary-{}.csv", now.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repositories::SqliteStore;
    use crate::testing::{pair, t0};

    #[test]
    fn detects_each_delimiter() {
        assert_eq!(detect_delimiter("word1,word2\nhello,world\n"), b',');
        assert_eq!(detect_delimiter("word1\tword2\nhello\tworld\n"), b'\t');
        assert_eq!(detect_delimiter("word1;word2\nhello;world\n"), b';');
    }

    #[test]
    fn single_column_text_falls_back_to_comma() {
        assert_eq!(detect_delimiter("hello\nworld\n"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn parses_pairs_skips_header_and_echoes_bad_rows() {
        let text = [
            "word1;word2;extra",
            "hola;adios;note",
            "uno;;missing-word2",
            ";missing-word1",
            "",
            "bonjour;hello",
            "a;b;c;d",
        ]
        .join("\n");

        let parsed = parse_vocabulary(&text).unwrap();
        assert_eq!(parsed.pairs, vec![pair("hola", "adios"), pair("bonjour", "hello")]);
        assert_eq!(
            parsed.rejected,
            vec!["uno;;missing-word2", ";missing-word1", "a;b;c;d"]
        );
    }

    #[test]
    fn strips_bom_and_trims_fields() {
        let parsed = parse_vocabulary("\u{feff} hund , dog \r\nkatze,cat\r\n").unwrap();
        assert_eq!(parsed.pairs, vec![pair("hund", "dog"), pair("katze", "cat")]);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn quoted_fields_may_contain_the_delimiter() {
        let parsed = parse_vocabulary("\"guten tag, freund\",\"hello, friend\"\n").unwrap();
        assert_eq!(parsed.pairs, vec![pair("guten tag, freund", "hello, friend")]);
    }

    #[test]
    fn import_upserts_and_reports() {
        let store = SqliteStore::in_memory();
        store.upsert_pairs(1, &[pair("hola", "adios")], t0()).unwrap();

        let report = import_cards(&store, 1, "hola,bonjour\nciao,hello\noops\n", t0()).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.rejected, vec!["oops"]);
    }

    #[test]
    fn import_without_pairs_is_a_validation_error() {
        let store = SqliteStore::in_memory();
        assert!(matches!(
            import_cards(&store, 1, "just some chatter", t0()),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(store.count_cards(1).unwrap(), 0);
    }

    #[test]
    fn export_is_sorted_quoted_and_reimportable() {
        let store = SqliteStore::in_memory();
        store
            .upsert_pairs(1, &[pair("zebra", "zebra"), pair("apfel", "apple, fruit")], t0())
            .unwrap();

        let (count, bytes) = export_cards(&store, 1).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "\u{feff}apfel,\"apple, fruit\"\r\nzebra,zebra\r\n");

        let parsed = parse_vocabulary(&text).unwrap();
        assert_eq!(parsed.pairs[0], pair("apfel", "apple, fruit"));
    }

    #[test]
    fn export_of_empty_deck_reports_no_cards() {
        let store = SqliteStore::in_memory();
        assert!(matches!(export_cards(&store, 1), Err(CoreError::NoCards)));
    }

    #[test]
    fn export_filename_carries_the_date() {
        assert_eq!(export_filename(t0()), "vocabulary-20240301.csv");
    }
}
