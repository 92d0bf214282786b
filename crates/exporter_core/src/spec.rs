use serde::Deserialize;

/// On-disk batch configuration, as the operator writes it. Field names match
/// the historical `config.json` shape for compatibility.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub exports: Vec<RawExportSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExportSpec {
    pub name: String,
    pub tab: String,
    #[serde(default)]
    pub filters: Option<RawFilters>,
    #[serde(default)]
    pub export: Option<RawExportOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFilters {
    #[serde(default, rename = "gradYear")]
    pub grad_year: Option<RawGradYear>,
    #[serde(default)]
    pub status: Option<RawStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGradYear {
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    #[serde(default)]
    pub values: StatusValues,
}

/// Status values accept either a JSON array or one delimited string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StatusValues {
    One(String),
    Many(Vec<String>),
}

impl Default for StatusValues {
    fn default() -> Self {
        StatusValues::Many(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExportOptions {
    #[serde(default, rename = "layoutOptionText")]
    pub layout_option_text: Option<String>,
}

/// One configured report, resolved and immutable. Specs are processed in
/// declared order and independently of one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpec {
    pub name: String,
    pub destination_tab: String,
    pub grad_year: Option<String>,
    pub statuses: Vec<String>,
    pub layout_display_name: String,
}

impl ExportSpec {
    pub fn from_raw(raw: RawExportSpec) -> Self {
        let layout_display_name = raw
            .export
            .as_ref()
            .and_then(|e| e.layout_option_text.clone())
            .unwrap_or_else(|| raw.name.replace('_', " "));
        let grad_year = raw.filters.as_ref().and_then(|f| {
            f.grad_year.as_ref().and_then(|g| {
                find_year(&g.selector).or_else(|| find_year(&raw.name))
            })
        });
        let statuses = raw
            .filters
            .as_ref()
            .and_then(|f| f.status.as_ref())
            .map(|s| parse_status_values(&s.values))
            .unwrap_or_default();
        Self {
            name: raw.name,
            destination_tab: raw.tab,
            grad_year,
            statuses,
            layout_display_name,
        }
    }
}

/// Parses the batch config JSON into resolved export specs, preserving order.
pub fn parse_batch(json: &str) -> Result<Vec<ExportSpec>, serde_json::Error> {
    let config: BatchConfig = serde_json::from_str(json)?;
    Ok(config.exports.into_iter().map(ExportSpec::from_raw).collect())
}

fn parse_status_values(values: &StatusValues) -> Vec<String> {
    match values {
        StatusValues::Many(list) => list
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
        StatusValues::One(joined) => joined
            .split(['|', ',', '/'])
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Recovers a 19xx/20xx year literal from free-form text such as a legacy
/// filter selector or the spec name.
fn find_year(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut run_start = None;
    for (i, b) in bytes.iter().chain(std::iter::once(&b' ')).enumerate() {
        if b.is_ascii_digit() {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            let run = &text[start..i];
            if run.len() == 4 && (run.starts_with("19") || run.starts_with("20")) {
                return Some(run.to_string());
            }
        }
    }
    None
}
