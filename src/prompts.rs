//! Prompts for the résumé analysis call.
//!
//! Everything the model is told lives here so prompt changes never touch
//! the pipeline, and tests can inspect the text without a provider.
//!
//! The user-turn instructions are a pure function of the job title and
//! description: the same inputs always produce byte-identical text.

/// Default system prompt for résumé review.
///
/// Used when `PipelineConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert in applicant tracking systems (ATS) and résumé analysis.
You will be shown the first page of a candidate's résumé as an image.
Review it honestly and in detail. Low scores are acceptable when the résumé deserves them."#;

/// The JSON shape the model must answer with.
///
/// Kept in sync with [`crate::feedback::Feedback`].
pub const RESPONSE_FORMAT: &str = r#"{
  "overallScore": number, // 0-100
  "ATS": {
    "score": number, // 0-100, how well the résumé survives an applicant tracking system
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ] // 3-4 tips
  },
  "toneAndStyle": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  },
  "content": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  },
  "structure": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  },
  "skills": {
    "score": number,
    "tips": [ { "type": "good" | "improve", "tip": string, "explanation": string } ]
  }
}"#;

/// Build the user-turn instructions for one submission.
///
/// Blank title or description are stated as "not provided" so the model
/// does not invent a target role.
pub fn build_instructions(job_title: &str, job_description: &str) -> String {
    let title = or_not_provided(job_title);
    let description = or_not_provided(job_description);
    format!(
        "Analyse this résumé and rate it against the job it is submitted for.\n\
         Point out weaknesses plainly and give concrete suggestions for each.\n\
         Use the job description to judge relevance when one is given.\n\
         \n\
         Job title: {title}\n\
         Job description: {description}\n\
         \n\
         Every score is a whole number from 0 to 100.\n\
         Every tip has \"type\" set to \"good\" or \"improve\".\n\
         List tips in order of importance.\n\
         \n\
         Answer with a single JSON object in this format:\n\
         {RESPONSE_FORMAT}\n\
         \n\
         Return only the JSON object, without a code fence or any other text."
    )
}

fn or_not_provided(s: &str) -> &str {
    let s = s.trim();
    if s.is_empty() {
        "(not provided)"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_embed_job_context() {
        let text = build_instructions("Engineer", "Build systems");
        assert!(text.contains("Job title: Engineer\n"));
        assert!(text.contains("Job description: Build systems\n"));
        assert!(text.contains(RESPONSE_FORMAT));
    }

    #[test]
    fn instructions_are_deterministic() {
        assert_eq!(
            build_instructions("Engineer", "Build systems"),
            build_instructions("Engineer", "Build systems")
        );
        assert_ne!(
            build_instructions("Engineer", "Build systems"),
            build_instructions("Designer", "Build systems")
        );
    }

    #[test]
    fn blank_context_is_marked() {
        let text = build_instructions("  ", "");
        assert!(text.contains("Job title: (not provided)"));
        assert!(text.contains("Job description: (not provided)"));
    }

    #[test]
    fn response_format_names_every_category() {
        for key in ["overallScore", "\"ATS\"", "toneAndStyle", "content", "structure", "skills"] {
            assert!(RESPONSE_FORMAT.contains(key), "missing {key}");
        }
    }
}
