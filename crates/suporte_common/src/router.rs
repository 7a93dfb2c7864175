//! Intent routing: deterministic keywords first, Ollama fallback second.
//!
//! Keyword matches are authoritative and never consult the model, so the
//! common phrasings stay fast and predictable even with the model offline.
//! Only unmatched text goes to the classification prompt, and any transport
//! failure degrades to "no tool" instead of surfacing an error.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ollama::{GenOptions, TextGen};
use crate::tools::Tool;

/// Message attached to a classification when the model service is down.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Não foi possível conectar à IA. Verifique se o Ollama está rodando.";

// Closed-vocabulary prompt: the model must answer with exactly one wire
// token (or NENHUMA). Parsing is containment-based, so stray prose around
// the token still classifies.
const CLASSIFY_PROMPT: &str = "\
Você é o assistente de TI do balcão de suporte. Seu trabalho é ajudar usuários com problemas de computador.

FERRAMENTAS DISPONÍVEIS:
1. RECONECTAR_PASTAS - Para problemas com pastas de rede, unidades mapeadas, acesso a servidor, \"não encontra o caminho\"
2. LIMPAR_CACHE - Para computador lento, travamentos, erros de memória, liberar espaço
3. REPARAR_OFFICE - Para problemas com Word, Excel, PowerPoint, Outlook travando, Office não abre
4. MANUTENCAO_PLANILHA - Para Excel bloqueado, planilha em uso, arquivo corrompido, não consegue salvar planilha

REGRAS:
- Responda APENAS com o nome da ferramenta mais adequada (ex: RECONECTAR_PASTAS)
- Se não souber ou não tiver ferramenta adequada, responda: NENHUMA
- Seja direto, sem explicações

Problema do usuário:";

/// Result of one classification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// The tool to run, or [`Tool::None`]
    pub tool: Tool,
    /// Advisory message for the user
    pub message: String,
    /// Whether a tool was found (by keyword or by the model)
    pub matched: bool,
}

/// Deterministic keyword matching, fixed priority order. First match wins.
pub fn match_keywords(text: &str) -> Option<Tool> {
    let lower = text.to_lowercase();
    let lower = lower.trim();

    if is_network_request(lower) {
        return Some(Tool::ReconnectNetwork);
    }
    if is_cache_request(lower) {
        return Some(Tool::ClearCache);
    }
    if is_office_request(lower) {
        return Some(Tool::RepairOffice);
    }
    if is_spreadsheet_request(lower) {
        return Some(Tool::UnlockSpreadsheet);
    }
    None
}

fn is_network_request(lower: &str) -> bool {
    let keywords = ["reconectar", "reconecta", "pastas", "rede", "unidade"];
    keywords.iter().any(|kw| lower.contains(kw))
}

fn is_cache_request(lower: &str) -> bool {
    let keywords = [
        "limpar cache",
        "limpa cache",
        "limpar o cache",
        "limpa o cache",
    ];
    keywords.iter().any(|kw| lower.contains(kw))
}

fn is_office_request(lower: &str) -> bool {
    let keywords = [
        "reparar office",
        "repara office",
        "consertar office",
        "conserta office",
    ];
    keywords.iter().any(|kw| lower.contains(kw))
}

fn is_spreadsheet_request(lower: &str) -> bool {
    let keywords = [
        "planilha",
        "excel bloqueado",
        "desbloquear planilha",
        "desbloquear excel",
    ];
    keywords.iter().any(|kw| lower.contains(kw))
}

/// Advisory message shown alongside a classification.
pub fn suggestion_message(tool: Tool) -> &'static str {
    match tool {
        Tool::ReconnectNetwork => {
            "Parece ser um problema de rede. Use 'Reconectar Pastas' para restaurar o acesso."
        }
        Tool::ClearCache => {
            "O sistema pode estar com cache cheio. Use 'Limpar Cache' para liberar memória."
        }
        Tool::RepairOffice => "Problema identificado no Office. Use 'Reparar Office' para corrigir.",
        Tool::UnlockSpreadsheet => {
            "Problema com planilha Excel. Use 'Manutenção de Planilhas' para desbloquear."
        }
        Tool::None => {
            "Não encontrei uma ferramenta específica para esse problema. Tente descrever de outra forma."
        }
    }
}

/// Classify a free-text problem description into a remediation tool.
///
/// Never returns an error: an unreachable model collapses to
/// `{tool: None, matched: false}` with an explanatory message.
pub async fn classify(text: &str, llm: &dyn TextGen) -> Classification {
    if let Some(tool) = match_keywords(text) {
        debug!("Keyword match: {:?}", tool);
        return Classification {
            tool,
            message: suggestion_message(tool).to_string(),
            matched: true,
        };
    }

    match llm.generate(CLASSIFY_PROMPT, text, GenOptions::CLASSIFY).await {
        Ok(raw) => {
            let tool = Tool::find_in_text(&raw);
            debug!("Model classification: {:?} (raw: {})", tool, raw);
            Classification {
                tool,
                message: suggestion_message(tool).to_string(),
                matched: tool != Tool::None,
            }
        }
        Err(e) => {
            warn!("Classification fallback unavailable: {}", e);
            Classification {
                tool: Tool::None,
                message: SERVICE_UNAVAILABLE_MESSAGE.to_string(),
                matched: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::{FakeTextGen, OllamaError};

    #[test]
    fn test_keyword_priority_order() {
        // "rede" and "planilha" both present: network wins, it is checked first.
        assert_eq!(
            match_keywords("planilha na rede não abre"),
            Some(Tool::ReconnectNetwork)
        );
    }

    #[test]
    fn test_keyword_sets() {
        assert_eq!(match_keywords("quero reconectar as unidades"), Some(Tool::ReconnectNetwork));
        assert_eq!(match_keywords("pode limpar o cache?"), Some(Tool::ClearCache));
        assert_eq!(match_keywords("consertar office por favor"), Some(Tool::RepairOffice));
        assert_eq!(match_keywords("excel bloqueado de novo"), Some(Tool::UnlockSpreadsheet));
        assert_eq!(match_keywords("meu mouse quebrou"), None);
    }

    #[tokio::test]
    async fn test_keyword_match_skips_model() {
        let fake = FakeTextGen::reply("LIMPAR_CACHE");

        let result = classify("não acesso a pasta da rede", &fake).await;
        assert!(result.matched);
        assert_eq!(result.tool, Tool::ReconnectNetwork);
        // The model was never consulted.
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_makes_exactly_one_call() {
        let fake = FakeTextGen::reply("RECONECTAR_PASTAS");

        let result = classify("o ícone sumiu do meu computador", &fake).await;
        assert!(result.matched);
        assert_eq!(result.tool, Tool::ReconnectNetwork);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_no_tool() {
        let fake = FakeTextGen::reply("NENHUMA");

        let result = classify("qual o sentido da vida?", &fake).await;
        assert!(!result.matched);
        assert_eq!(result.tool, Tool::None);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_unavailable_degrades_gracefully() {
        let fake = FakeTextGen::failing(OllamaError::Http("connection refused".to_string()));

        let result = classify("o ícone sumiu do meu computador", &fake).await;
        assert!(!result.matched);
        assert_eq!(result.tool, Tool::None);
        assert_eq!(result.message, SERVICE_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_fallback_accepts_prose_around_token() {
        let fake = FakeTextGen::reply("Acho que a melhor opção seria REPARAR_OFFICE nesse caso.");

        let result = classify("nada do escritório abre direito", &fake).await;
        assert!(result.matched);
        assert_eq!(result.tool, Tool::RepairOffice);
    }
}
