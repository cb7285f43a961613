use anyhow::Result;
use crossterm::style::Stylize;

use doi2bib_core::{AppConfig, LlmConfig, ModelConfig};

use crate::LlmAction;
use crate::terminal::{LineInput, read_line};

pub fn run(config: &mut AppConfig, action: LlmAction) -> Result<()> {
    match action {
        LlmAction::List => print!("{}", list_models(&config.llm)),
        LlmAction::Add => {
            let Some((name, model)) = prompt_model()? else {
                return Ok(());
            };
            config.llm.add_model(&name, model);
            config.save()?;
            println!("{}", format!("Model '{name}' added.").green().bold());
        }
        LlmAction::Rm => {
            print!("{}", list_models(&config.llm));
            let Some(name) = prompt("Enter the name of the model to remove: ")? else {
                return Ok(());
            };
            config.llm.remove_model(&name)?;
            config.save()?;
            println!("{}", format!("Model '{name}' removed.").green().bold());
        }
        LlmAction::Default => {
            print!("{}", list_models(&config.llm));
            let Some(name) = prompt("Enter the name of the model to set as default: ")? else {
                return Ok(());
            };
            config.llm.set_default(&name)?;
            config.save()?;
            println!("{}", format!("'{name}' is now the default model.").green().bold());
        }
    }
    Ok(())
}

pub fn list_models(llm: &LlmConfig) -> String {
    let mut out = String::from("Available models:\n");
    for (name, model) in &llm.models {
        if *name == llm.default_model {
            out.push_str(&format!("  - {name} (default)\n"));
        } else {
            out.push_str(&format!("  - {name}\n"));
        }
        out.push_str(&format!("    - Provider: {}\n", model.provider));
        out.push_str(&format!("    - URL: {}\n", model.url));
        out.push_str(&format!("    - Model: {}\n", model.model_name));
    }
    out
}

/// A non-empty answer, or `None` when the prompt is left blank or cancelled.
fn prompt(question: &str) -> Result<Option<String>> {
    Ok(match read_line(question)? {
        LineInput::Line(answer) if !answer.is_empty() => Some(answer),
        _ => None,
    })
}

fn prompt_model() -> Result<Option<(String, ModelConfig)>> {
    println!("Enter new model details (leave blank to cancel):");
    let Some(name) = prompt("Configuration name (e.g. 'ollama_mistral'): ")? else {
        return Ok(None);
    };
    let Some(provider) = prompt("Provider ('ollama' or 'groq'): ")? else {
        return Ok(None);
    };
    let Some(url) = prompt("URL (e.g. 'http://localhost:11434/api/generate'): ")? else {
        return Ok(None);
    };
    let Some(model_name) = prompt("Model name (e.g. 'mistral'): ")? else {
        return Ok(None);
    };
    let mut model = new_model(&provider, &url, &model_name);
    if model.provider == "groq" {
        model.api_key_env = prompt("API key environment variable (blank for GROQ_API_KEY): ")?;
    }
    Ok(Some((name, model)))
}

fn new_model(provider: &str, url: &str, model_name: &str) -> ModelConfig {
    ModelConfig {
        provider: provider.to_lowercase(),
        url: url.to_string(),
        model_name: model_name.to_string(),
        timeout_secs: 60,
        api_key_env: None,
        temperature: None,
        max_tokens: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_marks_the_default() {
        let mut llm = LlmConfig::default();
        llm.add_model("groq_llama", new_model("Groq", "", "llama-3.1-8b-instant"));
        let text = list_models(&llm);
        assert!(text.contains("  - ollama_default (default)\n"));
        assert!(text.contains("  - groq_llama\n    - Provider: groq\n"));
    }
}
