use crate::config::Config;
use crate::insights;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{self, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const SYSTEM_INSTRUCTION_INSIGHTS: &str =
    "You are an expert educational and financial data analyst for a school management SaaS. \
     Keep answers concise, professional, and actionable. Use Markdown formatting.";

fn generate(
    config: &Config,
    req: &Request,
    prompt: String,
    system_instruction: Option<&str>,
) -> serde_json::Value {
    match insights::generate_text(config, &prompt, system_instruction) {
        Ok(text) => ok(&req.id, json!({ "text": text })),
        Err(e) => {
            tracing::warn!(method = %req.method, error = %e, "text generation failed");
            err(&req.id, "ai_unavailable", format!("{e:#}"), None)
        }
    }
}

fn generate_insight(config: &Config, req: &Request) -> serde_json::Value {
    let prompt = match helpers::required_str(&req.params, "prompt") {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    generate(config, req, prompt, Some(SYSTEM_INSTRUCTION_INSIGHTS))
}

fn generate_lesson_plan(config: &Config, req: &Request) -> serde_json::Value {
    let fields = (|| -> Result<(String, String, String), HandlerErr> {
        Ok((
            helpers::required_trimmed(&req.params, "subject")?,
            helpers::required_trimmed(&req.params, "topic")?,
            helpers::required_trimmed(&req.params, "duration")?,
        ))
    })();
    let (subject, topic, duration) = match fields {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let prompt = format!(
        "Create a structured lesson plan for {} on the topic \"{}\". \
         Duration: {}. Include Learning Objectives, Activities, and Assessment. \
         Format as Markdown.",
        subject, topic, duration
    );
    generate(config, req, prompt, None)
}

fn analyze_financial_health(config: &Config, req: &Request) -> serde_json::Value {
    let Some(data) = req.params.get("data") else {
        return HandlerErr::bad_params("missing data").response(&req.id);
    };
    let data = match data {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let prompt = format!(
        "Analyze this financial summary JSON and provide 3 key bullet points for the school \
         director regarding cash flow and delinquency risks: {}",
        data
    );
    generate(config, req, prompt, None)
}

fn generate_document(config: &Config, req: &Request) -> serde_json::Value {
    let fields = (|| -> Result<(String, String, String), HandlerErr> {
        Ok((
            helpers::required_trimmed(&req.params, "studentName")?,
            helpers::required_trimmed(&req.params, "docType")?,
            helpers::required_trimmed(&req.params, "details")?,
        ))
    })();
    let (student_name, doc_type, details) = match fields {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let prompt = format!(
        "Act as a school registrar. Draft an official document of type \"{}\" for the student \
         \"{}\". Context/details: \"{}\". The document needs a formal letterhead (Nexus School \
         Management), an administrative body text, place and date (use today's date), and a \
         signature line. Use Markdown formatting.",
        doc_type, student_name, details
    );
    generate(config, req, prompt, None)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let config = state.config.clone();
    match req.method.as_str() {
        "ai.generateInsight" => Some(generate_insight(&config, req)),
        "ai.generateLessonPlan" => Some(generate_lesson_plan(&config, req)),
        "ai.analyzeFinancialHealth" => Some(analyze_financial_health(&config, req)),
        "ai.generateDocument" => Some(generate_document(&config, req)),
        _ => None,
    }
}
