//! `wait`.

use tracing::info;

use super::{Args, ExecContext, ExecResult, Outcome, ScriptResult, duration_from_seconds, fmt_seconds};

#[derive(Debug, Clone, PartialEq)]
pub struct WaitParams {
    pub seconds: f64,
}

impl WaitParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let seconds = args.seconds("duration")?;
        args.finish()?;
        Ok(Self { seconds })
    }

    pub fn to_args(&self) -> Vec<String> {
        vec![fmt_seconds(self.seconds)]
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        if ctx.wait(duration_from_seconds(self.seconds)?) {
            info!(seconds = self.seconds, "wait interrupted");
            Ok(Outcome::Interrupted)
        } else {
            Ok(Outcome::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tokenize;

    #[test]
    fn parses_fractional_seconds() {
        let tokens = tokenize("0.25").unwrap();
        assert_eq!(WaitParams::parse(Args::new("wait", &tokens)), Ok(WaitParams { seconds: 0.25 }));
    }

    #[test]
    fn rejects_negative_and_missing() {
        let tokens = tokenize("-1").unwrap();
        assert!(WaitParams::parse(Args::new("wait", &tokens)).is_err());
        assert!(WaitParams::parse(Args::new("wait", &[])).is_err());
    }

    #[test]
    fn rejects_waits_longer_than_a_day() {
        let tokens = tokenize("1e20").unwrap();
        assert!(WaitParams::parse(Args::new("wait", &tokens)).is_err());
        let tokens = tokenize("90000").unwrap();
        assert!(WaitParams::parse(Args::new("wait", &tokens)).is_err());
    }
}
