//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::io::AsyncWriteExt as _;

use crate::{
    cmd::extract::UnitRecord,
    prelude::*,
    unit::{DocumentResult, UnitResult},
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// A content unit input record.
    UnitRecord,
    /// A single unit's result.
    UnitResult,
    /// A whole document's result.
    DocumentResult,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    // Get our schema.
    let schema = match schema_opts.schema_type {
        SchemaType::UnitRecord => schema_for!(UnitRecord),
        SchemaType::UnitResult => schema_for!(UnitResult),
        SchemaType::DocumentResult => schema_for!(DocumentResult),
    };

    // Write out our schema.
    let schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    match schema_opts.output_path.as_deref() {
        Some(path) => {
            tokio::fs::write(path, schema_str.as_bytes())
                .await
                .with_context(|| format!("failed to write schema to {:?}", path))?;
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(schema_str.as_bytes())
                .await
                .context("failed to write schema")?;
            stdout.write_all(b"\n").await.context("failed to write schema")?;
            stdout.flush().await.context("failed to flush schema")?;
        }
    }
    Ok(())
}
