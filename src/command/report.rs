//! `showresults` and `exportresult`.

use std::path::PathBuf;

use tracing::info;

use super::token::quote;
use super::{Args, ExecContext, ExecResult, Outcome, ScriptResult};
use crate::export::{self, ExportFormat};

/// Log the summary of recorded results and keep it in the shared state
pub fn show_results(ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
    let summary = export::summary_text(ctx.state);
    for line in summary.lines() {
        info!("{}", line);
    }
    ctx.state.last_summary = Some(summary);
    Ok(Outcome::Completed)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportParams {
    pub format: ExportFormat,
    /// Destination; defaults to `results.<ext>` in the session directory
    pub path: Option<PathBuf>,
}

impl ExportParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let format = args
            .keyword(|w| w.parse::<ExportFormat>().ok())
            .unwrap_or_default();
        let path = args.next().map(|t| PathBuf::from(&t.text));
        args.finish()?;
        Ok(Self { format, path })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = vec![self.format.as_str().to_string()];
        if let Some(path) = &self.path {
            out.push(quote(&path.to_string_lossy()));
        }
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| ctx.session.file_path(&format!("results.{}", self.format.extension())));
        let written = export::write_results(self.format, ctx.state, &path)?;
        info!(
            path = %written.display(),
            format = self.format.as_str(),
            results = ctx.state.test_results.len(),
            "results exported"
        );
        ctx.state.last_export = Some(written);
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tokenize;

    fn export(line: &str) -> ScriptResult<ExportParams> {
        let tokens = tokenize(line).unwrap();
        ExportParams::parse(Args::new("exportresult", &tokens))
    }

    #[test]
    fn defaults_to_csv_in_session() {
        assert_eq!(export(""), Ok(ExportParams::default()));
    }

    #[test]
    fn format_and_path() {
        assert_eq!(
            export(r#"json "out/results run.json""#),
            Ok(ExportParams {
                format: ExportFormat::Json,
                path: Some(PathBuf::from("out/results run.json")),
            })
        );
    }

    #[test]
    fn quoted_format_word_is_a_path() {
        assert_eq!(
            export(r#""txt""#),
            Ok(ExportParams {
                format: ExportFormat::Csv,
                path: Some(PathBuf::from("txt")),
            })
        );
        assert!(export("csv a b").is_err());
    }
}
