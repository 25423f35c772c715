//! Analysis result types. Deserialized from the model's JSON answer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    #[serde(alias = "Technical", alias = "TECHNICAL")]
    Technical,
    #[serde(alias = "Business", alias = "BUSINESS")]
    Business,
    #[serde(other)]
    Other,
}

impl QuestionCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Technical => "TECHNICAL",
            Self::Business => "BUSINESS",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnalysis {
    pub message_id: i64,
    pub text: String,
    pub category: QuestionCategory,
    pub is_answered: bool,
    #[serde(default)]
    pub answer_message_id: Option<i64>,
    #[serde(default)]
    pub response_time_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerAnalysis {
    pub message_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub answers_to_message_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_questions: u32,
    pub answered: u32,
    pub unanswered: u32,
    #[serde(default)]
    pub avg_response_time_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub questions: Vec<QuestionAnalysis>,
    #[serde(default)]
    pub answers: Vec<AnswerAnalysis>,
    #[serde(default)]
    pub summary: AnalysisSummary,
}

impl AnalysisResult {
    /// Zero-valued result for an empty message window.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_questions(&self) -> bool {
        self.summary.total_questions > 0
    }

    /// `answered + unanswered == total == questions.len()`.
    pub fn is_consistent(&self) -> bool {
        let s = &self.summary;
        u64::from(s.answered) + u64::from(s.unanswered) == u64::from(s.total_questions)
            && s.total_questions as usize == self.questions.len()
    }

    /// Recompute summary counts from the question list.
    ///
    /// The model's average response time is kept when present, otherwise it is the
    /// mean of the answered questions' response times.
    pub fn normalized(mut self) -> Self {
        let total = self.questions.len() as u32;
        let answered = self.questions.iter().filter(|q| q.is_answered).count() as u32;
        let avg = self.summary.avg_response_time_minutes.or_else(|| {
            let times: Vec<f64> = self
                .questions
                .iter()
                .filter(|q| q.is_answered)
                .filter_map(|q| q.response_time_minutes)
                .collect();
            if times.is_empty() {
                None
            } else {
                Some(times.iter().sum::<f64>() / times.len() as f64)
            }
        });
        self.summary = AnalysisSummary {
            total_questions: total,
            answered,
            unanswered: total - answered,
            avg_response_time_minutes: avg,
        };
        self
    }
}
