// Prompt templates for the evaluation stages.
// Placeholders are `{name}` tokens filled by `fill`; weights come from `scores`.

use super::scores::{
    percent, ACHIEVEMENTS_WEIGHT, CODE_QUALITY_WEIGHT, CORRECTNESS_WEIGHT, CREATIVITY_WEIGHT,
    CULTURAL_FIT_WEIGHT, DOCUMENTATION_WEIGHT, EXPERIENCE_LEVEL_WEIGHT, MATCH_RATE_FACTOR,
    RESILIENCE_WEIGHT, TECHNICAL_SKILLS_WEIGHT,
};
use crate::rag::NO_CONTEXT;

/// CV evaluation prompt.
/// Replace: {job_title}, {context}, {cv_text}, the four `{w_*}` weights and {match_rate_factor}.
pub const CV_EVALUATION_TEMPLATE: &str = r#"You are an expert HR recruiter evaluating a candidate's CV for a {job_title} position.

REFERENCE CONTEXT (job description and CV scoring rubric):
{context}

CANDIDATE CV:
{cv_text}

Your task is to evaluate the candidate's CV against the job description using the scoring rubric provided.

Evaluate the following parameters (1-5 scale):
1. Technical Skills Match (Weight: {w_technical}%) - Alignment with job requirements (backend, databases, APIs, cloud, AI/LLM)
2. Experience Level (Weight: {w_experience}%) - Years of experience and project complexity
3. Relevant Achievements (Weight: {w_achievements}%) - Impact of past work (scaling, performance, adoption)
4. Cultural/Collaboration Fit (Weight: {w_cultural}%) - Communication, learning mindset, teamwork/leadership

Return your response in the following JSON format:
{
  "technical_skills_score": <1-5>,
  "experience_level_score": <1-5>,
  "achievements_score": <1-5>,
  "cultural_fit_score": <1-5>,
  "weighted_average": <calculated weighted average>,
  "match_rate": <weighted_average * {match_rate_factor}, as decimal 0-1>,
  "feedback": "<detailed feedback 3-5 sentences explaining strengths and gaps>"
}

Be objective and thorough. Provide specific examples from the CV to justify your scores."#;

/// Project report evaluation prompt.
/// Replace: {context}, {project_text} and the five `{w_*}` weights.
pub const PROJECT_EVALUATION_TEMPLATE: &str = r#"You are an expert technical evaluator assessing a candidate's project report for a backend developer take-home assignment.

REFERENCE CONTEXT (case study brief and project scoring rubric):
{context}

CANDIDATE'S PROJECT REPORT:
{project_text}

Your task is to evaluate the candidate's project report against the case study requirements using the scoring rubric.

Evaluate the following parameters (1-5 scale):
1. Correctness (Weight: {w_correctness}%) - Implements prompt design, LLM chaining, RAG context injection
2. Code Quality & Structure (Weight: {w_code_quality}%) - Clean, modular, reusable, tested
3. Resilience & Error Handling (Weight: {w_resilience}%) - Handles long jobs, retries, randomness, API failures
4. Documentation & Explanation (Weight: {w_documentation}%) - README clarity, setup instructions, trade-off explanations
5. Creativity/Bonus (Weight: {w_creativity}%) - Extra features beyond requirements

Return your response in the following JSON format:
{
  "correctness_score": <1-5>,
  "code_quality_score": <1-5>,
  "resilience_score": <1-5>,
  "documentation_score": <1-5>,
  "creativity_score": <1-5>,
  "weighted_average": <calculated weighted average>,
  "project_score": <weighted_average as decimal 1-5>,
  "feedback": "<detailed feedback 3-5 sentences explaining what was done well and what could be improved>"
}

Be thorough and specific. Reference actual implementation details from the report."#;

/// Final summary prompt. Plain prose, no JSON.
/// Replace: {job_title}, {cv_match_rate}, {cv_feedback}, {project_score}, {project_feedback}.
pub const SUMMARY_TEMPLATE: &str = r#"You are an expert technical hiring manager making a final assessment of a candidate for a {job_title} position.

CV EVALUATION RESULTS:
- Match Rate: {cv_match_rate} (out of 1.0)
- Feedback: {cv_feedback}

PROJECT EVALUATION RESULTS:
- Project Score: {project_score} (out of 5.0)
- Feedback: {project_feedback}

Based on both evaluations, provide a concise overall summary (3-5 sentences) that includes:
1. Overall strengths of the candidate
2. Key gaps or areas for improvement
3. Final recommendation (Strong Hire / Hire / Maybe / No Hire)

Return ONLY the summary text, no JSON format needed. Be direct and actionable."#;

pub fn build_cv_prompt(job_title: &str, context: &str, cv_text: &str) -> String {
    fill(
        CV_EVALUATION_TEMPLATE,
        &[
            ("job_title", job_title),
            ("context", context_or_sentinel(context)),
            ("cv_text", cv_text),
            ("w_technical", &percent(TECHNICAL_SKILLS_WEIGHT).to_string()),
            ("w_experience", &percent(EXPERIENCE_LEVEL_WEIGHT).to_string()),
            ("w_achievements", &percent(ACHIEVEMENTS_WEIGHT).to_string()),
            ("w_cultural", &percent(CULTURAL_FIT_WEIGHT).to_string()),
            ("match_rate_factor", &MATCH_RATE_FACTOR.to_string()),
        ],
    )
}

pub fn build_project_prompt(context: &str, project_text: &str) -> String {
    fill(
        PROJECT_EVALUATION_TEMPLATE,
        &[
            ("context", context_or_sentinel(context)),
            ("project_text", project_text),
            ("w_correctness", &percent(CORRECTNESS_WEIGHT).to_string()),
            ("w_code_quality", &percent(CODE_QUALITY_WEIGHT).to_string()),
            ("w_resilience", &percent(RESILIENCE_WEIGHT).to_string()),
            ("w_documentation", &percent(DOCUMENTATION_WEIGHT).to_string()),
            ("w_creativity", &percent(CREATIVITY_WEIGHT).to_string()),
        ],
    )
}

pub fn build_summary_prompt(
    job_title: &str,
    cv_match_rate: f64,
    cv_feedback: &str,
    project_score: f64,
    project_feedback: &str,
) -> String {
    fill(
        SUMMARY_TEMPLATE,
        &[
            ("job_title", job_title),
            ("cv_match_rate", &format!("{cv_match_rate:.2}")),
            ("cv_feedback", cv_feedback),
            ("project_score", &format!("{project_score:.2}")),
            ("project_feedback", project_feedback),
        ],
    )
}

fn context_or_sentinel(context: &str) -> &str {
    if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    }
}

/// Substitutes `{name}` placeholders in a single pass, so substituted values
/// are never scanned for placeholders themselves. Unknown `{...}` spans are
/// copied through.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
