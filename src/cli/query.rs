use std::{fmt::Write as _, io::Write, path::PathBuf};

use anyhow::{Context as _, bail};
use arrow::{
    array::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use tabwriter::TabWriter;
use tracing::debug;

use crate::cli::{Cli, Output, color::CliExamples};

#[derive(Debug, clap::Args)]
#[command(after_long_help = CliExamples("
  # Run a query against the selected database
  metabasic query \"SELECT id, total FROM orders LIMIT 5\"

  # Run a query from a file and print the raw JSON response
  metabasic -O json query -f report.sql
"))]
pub(crate) struct QueryArgs {
    /// Do not truncate output
    #[arg(long)]
    pub no_trunc: bool,
    /// Read query from file
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Limit number of printed rows. (use --all-rows to disable this)
    #[arg(long, default_value = "10")]
    pub max_rows: Option<usize>,
    /// Do not limit printed rows. Supercedes --max-rows
    #[arg(long)]
    pub all_rows: bool,
    /// Sql
    pub sql: Option<String>,
}

pub(crate) fn handle(cli: &Cli, args: QueryArgs) -> anyhow::Result<()> {
    let QueryArgs {
        no_trunc,
        file,
        max_rows,
        all_rows,
        sql,
    } = args;

    let sql_query = match (sql, file) {
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (Some(s), None) => s,
        _ => bail!("exactly one of either '--file' or inline SQL must be specified"),
    };

    let row_limit = if let Some(n) = max_rows
        && n > 0
        && !all_rows
    {
        Some(n)
    } else {
        None
    };

    match cli.global.output.unwrap_or_default() {
        Output::Json => {
            let value = cli.client.query(&sql_query).context("Query failed")?;

            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &value)?;
            writeln!(stdout)?;
        }
        Output::Tty => {
            let batch = cli
                .client
                .get_dataframe(&sql_query)
                .context("Query failed")?;

            debug!(rows = batch.num_rows(), "query returned");
            print_tty(&mut std::io::stdout().lock(), &batch, row_limit, !no_trunc)?;
        }
    }

    Ok(())
}

fn print_tty(
    out: &mut impl Write,
    batch: &RecordBatch,
    row_limit: Option<usize>,
    truncate: bool,
) -> anyhow::Result<()> {
    const TRUNCATE_TO_COLUMN_WIDTH: usize = 32;

    let schema = batch.schema();

    // Print the schema.
    {
        let mut tw = TabWriter::new(&mut *out);

        writeln!(tw, "COLUMN\tTYPE")?;
        for field in schema.fields() {
            writeln!(tw, "{}\t{}", field.name(), field.data_type())?;
        }

        tw.flush()?;
        writeln!(out)?;
    }

    if schema.fields().is_empty() {
        writeln!(out, "No columns to display.")?;
        return Ok(());
    }

    if batch.num_rows() == 0 {
        eprintln!("No results!");
        return Ok(());
    }

    let shown = row_limit.map_or(batch.num_rows(), |n| n.min(batch.num_rows()));

    let mut tw = TabWriter::new(&mut *out);
    let headers: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    writeln!(tw, "{}", headers.join("\t"))?;

    let options = FormatOptions::default().with_null("(null)");
    let formatters: Vec<_> = batch
        .columns()
        .iter()
        .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
        .collect::<Result<_, _>>()?;

    // Track if we truncated any values, so we can print a helpful note at the end.
    let mut truncation_occurred = false;
    let mut buf = String::new();

    for row in 0..shown {
        for (i, formatter) in formatters.iter().enumerate() {
            if i > 0 {
                write!(tw, "\t")?;
            }

            buf.clear();
            write!(buf, "{}", formatter.value(row))?;

            // Tabs and newlines inside a value would break the table.
            let value = buf.replace(['\t', '\n'], " ");
            if truncate && value.chars().count() > TRUNCATE_TO_COLUMN_WIDTH {
                truncation_occurred = true;
                let cut: String = value.chars().take(TRUNCATE_TO_COLUMN_WIDTH - 3).collect();
                write!(tw, "{cut}...")?;
            } else {
                write!(tw, "{value}")?;
            }
        }

        writeln!(tw)?;
    }

    tw.flush()?;
    drop(tw);

    if shown < batch.num_rows() {
        eprintln!(
            "\nShowing {shown} of {} rows. Use --all-rows to see all of them.",
            batch.num_rows()
        );
    }

    if truncation_occurred {
        eprintln!("\nNote: some values were truncated. Use --no-trunc to see full values.");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use arrow::{
        array::{Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };

    use super::*;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("id", DataType::Int64, true),
        ]);

        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec![
                    Some("a"),
                    None,
                    Some("a very long value that goes past the column width"),
                ])),
                Arc::new(Int64Array::from(vec![1, 2, 3])),
            ],
        )
        .unwrap()
    }

    fn render(row_limit: Option<usize>, truncate: bool) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        print_tty(&mut out, &batch(), row_limit, truncate)?;
        Ok(String::from_utf8(out)?
            .lines()
            .map(|l| l.trim_end().to_string())
            .collect())
    }

    #[test]
    fn prints_schema_and_rows() -> anyhow::Result<()> {
        let lines = render(None, true)?;

        assert_eq!(lines[0], "COLUMN  TYPE");
        assert_eq!(lines[1], "name    Utf8");
        assert_eq!(lines[2], "id      Int64");
        assert_eq!(lines[3], "");
        assert!(lines[4].starts_with("name"));
        assert!(lines[5].starts_with("a "));
        assert!(lines[6].starts_with("(null)"));
        assert!(lines[7].starts_with("a very long value that goes ..."));

        Ok(())
    }

    #[test]
    fn no_truncation() -> anyhow::Result<()> {
        let lines = render(None, false)?;
        assert!(lines[7].starts_with("a very long value that goes past the column width"));

        Ok(())
    }

    #[test]
    fn row_limit() -> anyhow::Result<()> {
        let lines = render(Some(1), true)?;
        assert_eq!(lines.len(), 6);

        Ok(())
    }
}
