//! Turning comparison results into output lines and exit codes.

use crate::engine::EngineError;
use likeness_core::{CompareError, MatchOutcome, MissingFace};
use serde::Serialize;
use std::path::Path;

pub const EXIT_DECIDED: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NO_FACE: u8 = 2;
pub const EXIT_DECODE: u8 = 3;
pub const EXIT_TIMEOUT: u8 = 4;

pub type PairResult = Result<MatchOutcome, EngineError>;

/// The single human-readable result line for a comparison that reached an outcome.
pub fn outcome_line(outcome: &MatchOutcome) -> String {
    match outcome {
        MatchOutcome::Match(d) => format!("Faces match! Distance: {}", d.distance),
        MatchOutcome::NoMatch(d) => format!("Faces do not match. Distance: {}", d.distance),
        MatchOutcome::NoFaceDetected { .. } => "One or both images do not contain faces.".to_string(),
    }
}

pub fn exit_code(result: &PairResult) -> u8 {
    match result {
        Ok(MatchOutcome::Match(_) | MatchOutcome::NoMatch(_)) => EXIT_DECIDED,
        Ok(MatchOutcome::NoFaceDetected { .. }) => EXIT_NO_FACE,
        Err(EngineError::Compare(CompareError::Decode { .. })) => EXIT_DECODE,
        Err(EngineError::Timeout(_)) => EXIT_TIMEOUT,
        Err(_) => EXIT_FAILURE,
    }
}

fn error_kind(err: &EngineError) -> &'static str {
    match err {
        EngineError::Compare(CompareError::Decode { .. }) => "decode",
        EngineError::Compare(CompareError::NoFace(_)) => "no_face",
        EngineError::Compare(CompareError::Descriptor(_)) => "descriptor",
        EngineError::Timeout(_) => "timeout",
        EngineError::ChannelClosed | EngineError::Spawn(_) => "engine",
    }
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    kind: &'static str,
    message: String,
}

/// Machine-readable form of one comparison.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    first: &'a Path,
    second: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<MatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

impl<'a> JsonReport<'a> {
    pub fn new(first: &'a Path, second: &'a Path, result: &PairResult) -> Self {
        let (result, error) = match result {
            Ok(outcome) => (Some(*outcome), None),
            Err(e) => (
                None,
                Some(ErrorReport {
                    kind: error_kind(e),
                    message: e.to_string(),
                }),
            ),
        };
        Self { first, second, result, error }
    }
}

/// Print one comparison: result line on stdout, diagnostics on stderr.
pub fn print_human(prefix: Option<&str>, result: &PairResult) {
    let prefix = prefix.map(|p| format!("{p}: ")).unwrap_or_default();
    match result {
        Ok(outcome) => {
            println!("{prefix}{}", outcome_line(outcome));
            if let MatchOutcome::NoFaceDetected { missing } = outcome {
                eprintln!("{prefix}no face detected in {}", describe_missing(*missing));
            }
        }
        Err(e) => eprintln!("{prefix}error: {e}"),
    }
}

fn describe_missing(missing: MissingFace) -> &'static str {
    match missing {
        MissingFace::First => "the first image",
        MissingFace::Second => "the second image",
        MissingFace::Both => "either image",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::{MatchDecision, Threshold};
    use std::time::Duration;

    fn decision(distance: f32, is_match: bool) -> MatchDecision {
        MatchDecision { distance, threshold: Threshold::default(), is_match }
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(
            outcome_line(&MatchOutcome::Match(decision(0.25, true))),
            "Faces match! Distance: 0.25"
        );
        assert_eq!(
            outcome_line(&MatchOutcome::NoMatch(decision(0.75, false))),
            "Faces do not match. Distance: 0.75"
        );
        assert_eq!(
            outcome_line(&MatchOutcome::NoFaceDetected { missing: MissingFace::Both }),
            "One or both images do not contain faces."
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(MatchOutcome::Match(decision(0.1, true)))), EXIT_DECIDED);
        assert_eq!(exit_code(&Ok(MatchOutcome::NoMatch(decision(0.9, false)))), EXIT_DECIDED);
        assert_eq!(
            exit_code(&Ok(MatchOutcome::NoFaceDetected { missing: MissingFace::First })),
            EXIT_NO_FACE
        );
        assert_eq!(exit_code(&Err(EngineError::Timeout(Duration::from_secs(1)))), EXIT_TIMEOUT);
        assert_eq!(exit_code(&Err(EngineError::ChannelClosed)), EXIT_FAILURE);

        let decode = likeness_core::decode_bytes(b"xx").unwrap_err();
        let err = EngineError::Compare(CompareError::Decode {
            slot: likeness_core::ImageSlot::First,
            source: decode,
        });
        assert_eq!(exit_code(&Err(err)), EXIT_DECODE);
    }

    #[test]
    fn test_json_report_decision() {
        let result: PairResult = Ok(MatchOutcome::Match(decision(0.25, true)));
        let report = JsonReport::new(Path::new("a.jpg"), Path::new("b.jpg"), &result);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["first"], "a.jpg");
        assert_eq!(value["result"]["outcome"], "match");
        assert_eq!(value["result"]["distance"], 0.25);
        assert_eq!(value["result"]["threshold"], 0.5);
        assert_eq!(value["result"]["is_match"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_json_report_no_face() {
        let result: PairResult = Ok(MatchOutcome::NoFaceDetected { missing: MissingFace::Second });
        let report = JsonReport::new(Path::new("a.jpg"), Path::new("b.jpg"), &result);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["result"]["outcome"], "no_face_detected");
        assert_eq!(value["result"]["missing"], "second");
    }

    #[test]
    fn test_json_report_error() {
        let result: PairResult = Err(EngineError::Timeout(Duration::from_secs(3)));
        let report = JsonReport::new(Path::new("a.jpg"), Path::new("b.jpg"), &result);
        let value = serde_json::to_value(&report).unwrap();

        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["kind"], "timeout");
    }
}
