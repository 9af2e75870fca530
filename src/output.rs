use crate::error::Error;
use crate::link::Link;
use crate::links::LinkSet;
use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Write;
use std::str::FromStr;

/// Serialization format for the discovered link set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::UnsupportedOutputFormat(other.to_string())),
        }
    }
}

impl Serialize for OutputFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Output filename: stem, run timestamp, format extension.
pub fn out_filename(stem: &str, format: OutputFormat) -> String {
    format!(
        "{}_{}.{}",
        stem,
        Local::now().format("%Y%m%d%H%M%S"),
        format.as_str()
    )
}

/// Write a link set to `w` in the requested format.
pub fn write_links<W: Write>(links: &LinkSet, format: OutputFormat, w: W) -> Result<(), Error> {
    match format {
        OutputFormat::Csv => write_csv(links, w),
        OutputFormat::Json => {
            let records: Vec<&Link> = links.iter().collect();
            serde_json::to_writer(w, &records)?;
            Ok(())
        }
    }
}

/// Ordered CSV with 1-based row numbers. Row order follows set iteration
/// order and is unspecified across runs.
fn write_csv<W: Write>(links: &LinkSet, w: W) -> Result<(), Error> {
    let mut writer = csv::Writer::from_writer(w);
    writer.write_record(["no", "from", "to", "onclick", "method"])?;
    for (i, link) in links.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string().as_str(),
            link.from.as_str(),
            link.to.as_ref().map(|u| u.as_str()).unwrap_or(""),
            link.attr_onclick.as_str(),
            link.method.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a JSON array of link records back into a set.
pub fn read_links_json(data: &str) -> Result<LinkSet, Error> {
    let records: Vec<Link> = serde_json::from_str(data)?;
    Ok(records.into_iter().collect())
}
