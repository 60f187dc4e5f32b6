use std::io::Write;

use crate::error::AppError;
use crate::nimbusec::{EMPTY_FILTER, NimbusecApi};

/// Writes every remote domain as `name,,scheme,bundle,`, the layout `sync`
/// reads back. Returns the number of rows written.
pub async fn run<A: NimbusecApi, W: Write>(api: &A, out: W) -> Result<usize, AppError> {
    let domains = api.find_domains(EMPTY_FILTER).await?;

    let mut writer = csv::Writer::from_writer(out);
    for domain in &domains {
        writer.write_record([
            domain.name.as_str(),
            "",
            domain.scheme.as_str(),
            domain.bundle.as_str(),
            "",
        ])?;
    }
    writer.flush()?;
    Ok(domains.len())
}
