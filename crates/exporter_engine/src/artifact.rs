use encoding_rs::{Encoding, UTF_8};
use exporter_core::TabularArtifact;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode artifact with {encoding}")]
    DecodeFailure { encoding: String },
}

/// Decodes a downloaded artifact: byte-order-mark aware first (exports often
/// carry a UTF-8 BOM), plain UTF-8 otherwise.
pub fn decode_artifact(bytes: &[u8]) -> Result<String, DecodeError> {
    let encoding = Encoding::for_bom(bytes).map_or(UTF_8, |(enc, _)| enc);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: encoding.name().to_string(),
        });
    }
    Ok(text.into_owned())
}

/// Parses delimited artifact text into headers plus string-typed rows. All
/// cells stay strings; no numeric coercion happens here or downstream.
pub fn parse_artifact(text: &str) -> Result<TabularArtifact, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(TabularArtifact { headers, rows })
}
