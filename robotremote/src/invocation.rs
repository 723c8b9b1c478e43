//! Result record of a keyword invocation.

use serde::{Deserialize, Serialize};

use crate::value::WireValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeywordStatus {
    Pass,
    Fail,
}

impl KeywordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Outcome of one `run_keyword` call. Every field is wire-safe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordResult {
    pub status: KeywordStatus,
    #[serde(rename = "return")]
    pub return_value: WireValue,
    pub output: WireValue,
    pub error: WireValue,
    pub traceback: String,
}

impl KeywordResult {
    pub fn passed(return_value: WireValue) -> Self {
        Self {
            status: KeywordStatus::Pass,
            return_value,
            output: WireValue::empty(),
            error: WireValue::empty(),
            traceback: String::new(),
        }
    }

    pub fn failed(error: WireValue, traceback: String) -> Self {
        Self {
            status: KeywordStatus::Fail,
            return_value: WireValue::empty(),
            output: WireValue::empty(),
            error,
            traceback,
        }
    }

    pub fn with_output(mut self, output: WireValue) -> Self {
        self.output = output;
        self
    }

    pub fn is_pass(&self) -> bool {
        self.status.is_pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(KeywordStatus::Pass.as_str(), "PASS");
        assert_eq!(KeywordStatus::Fail.as_str(), "FAIL");
        assert_eq!(
            serde_json::from_str::<KeywordStatus>("\"FAIL\"").unwrap(),
            KeywordStatus::Fail
        );
    }

    #[test]
    fn passed_result_serializes_all_fields() {
        let result = KeywordResult::passed(WireValue::Int(42)).with_output("hello\n".into());
        insta::assert_json_snapshot!(result, @r#"
        {
          "status": "PASS",
          "return": 42,
          "output": "hello\n",
          "error": "",
          "traceback": ""
        }
        "#);
    }

    #[test]
    fn failed_result_has_empty_return() {
        let result = KeywordResult::failed(
            "ValueError: bad".into(),
            "Traceback (most recent call last):\n".to_string(),
        );
        assert!(!result.is_pass());
        insta::assert_json_snapshot!(result, @r#"
        {
          "status": "FAIL",
          "return": "",
          "output": "",
          "error": "ValueError: bad",
          "traceback": "Traceback (most recent call last):\n"
        }
        "#);
    }
}
