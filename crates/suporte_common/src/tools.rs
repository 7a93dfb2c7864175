//! Remediation tool catalog.
//!
//! Every capability the assistant can run is bound to exactly one external
//! script or internal workflow. All token/label/script mappings are total
//! and live only here, so adding a tool is a single edit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code the kill-based scripts return when the process they were asked
/// to terminate was not running. Callers treat it as success.
pub const EXIT_PROCESS_NOT_FOUND: i32 = 128;

/// One remediation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Tool {
    /// Re-map network folders and drives
    ReconnectNetwork,
    /// Flush temp files to free memory and disk space
    ClearCache,
    /// Repair the Office installation
    RepairOffice,
    /// Unlock a stuck spreadsheet (internal pipeline, not a script)
    UnlockSpreadsheet,
    /// No applicable tool
    #[default]
    None,
}

impl Tool {
    /// Actionable tools in fixed classification priority order.
    pub const PRIORITY: [Tool; 4] = [
        Tool::ReconnectNetwork,
        Tool::ClearCache,
        Tool::RepairOffice,
        Tool::UnlockSpreadsheet,
    ];

    /// Stable identifier: the script base name for script-backed tools, or
    /// the workflow identifier for the spreadsheet pipeline.
    pub fn id(&self) -> Option<&'static str> {
        match self {
            Tool::ReconnectNetwork => Some("reconnect-network"),
            Tool::ClearCache => Some("clear-cache"),
            Tool::RepairOffice => Some("repair-office"),
            Tool::UnlockSpreadsheet => Some("planilha"),
            Tool::None => None,
        }
    }

    /// True for tools backed by an external script. UnlockSpreadsheet runs
    /// the internal repair pipeline instead of a script.
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Tool::ReconnectNetwork | Tool::ClearCache | Tool::RepairOffice
        )
    }

    /// Wire token used in model prompts and scanned for in model replies.
    pub fn token(&self) -> &'static str {
        match self {
            Tool::ReconnectNetwork => "RECONECTAR_PASTAS",
            Tool::ClearCache => "LIMPAR_CACHE",
            Tool::RepairOffice => "REPARAR_OFFICE",
            Tool::UnlockSpreadsheet => "MANUTENCAO_PLANILHA",
            Tool::None => "NENHUMA",
        }
    }

    /// Human-readable label shown to users. Wire tokens never leak into
    /// displayed text.
    pub fn label(&self) -> &'static str {
        match self {
            Tool::ReconnectNetwork => "Reconectar Pastas",
            Tool::ClearCache => "Limpar Cache",
            Tool::RepairOffice => "Reparar Office",
            Tool::UnlockSpreadsheet => "Manutenção de Planilhas",
            Tool::None => "Nenhuma",
        }
    }

    /// Whether a nonzero "process not found" exit from this tool's script
    /// should be reported as success. Holds for the scripts that start by
    /// killing a process that may not be running.
    pub fn treats_missing_process_as_success(&self) -> bool {
        matches!(self, Tool::ReconnectNetwork | Tool::RepairOffice)
    }

    /// Scan free text (model output) for a tool mention, case-insensitively,
    /// in priority order. Accepts tokens spelled with a space instead of an
    /// underscore, and a bare "PLANILHA" mention for the spreadsheet tool.
    pub fn find_in_text(text: &str) -> Tool {
        let upper = text.to_uppercase();
        for tool in Self::PRIORITY {
            let token = tool.token();
            if upper.contains(token) || upper.contains(&token.replace('_', " ")) {
                return tool;
            }
        }
        if upper.contains("PLANILHA") {
            return Tool::UnlockSpreadsheet;
        }
        Tool::None
    }

    /// Parse a CLI identifier (the stable id from [`Tool::id`]).
    pub fn from_cli_name(name: &str) -> Option<Tool> {
        let name = name.trim().to_lowercase();
        Self::PRIORITY
            .into_iter()
            .find(|tool| tool.id() == Some(name.as_str()))
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_mapping_is_total_for_actionable_tools() {
        for tool in Tool::PRIORITY {
            assert!(tool.id().is_some(), "{tool:?} must map to an identifier");
        }
        assert!(Tool::None.id().is_none());
    }

    #[test]
    fn test_script_backed_tools() {
        assert!(Tool::ReconnectNetwork.is_script());
        assert!(Tool::ClearCache.is_script());
        assert!(Tool::RepairOffice.is_script());
        assert!(!Tool::UnlockSpreadsheet.is_script());
        assert!(!Tool::None.is_script());
    }

    #[test]
    fn test_find_in_text_matches_tokens() {
        assert_eq!(Tool::find_in_text("RECONECTAR_PASTAS"), Tool::ReconnectNetwork);
        assert_eq!(Tool::find_in_text("use limpar_cache agora"), Tool::ClearCache);
        assert_eq!(Tool::find_in_text("REPARAR OFFICE"), Tool::RepairOffice);
        assert_eq!(Tool::find_in_text("MANUTENCAO_PLANILHA"), Tool::UnlockSpreadsheet);
    }

    #[test]
    fn test_find_in_text_priority_order() {
        // Both tokens present: the network tool wins, it comes first.
        let text = "RECONECTAR_PASTAS ou LIMPAR_CACHE";
        assert_eq!(Tool::find_in_text(text), Tool::ReconnectNetwork);
    }

    #[test]
    fn test_find_in_text_bare_planilha() {
        assert_eq!(
            Tool::find_in_text("sua planilha parece travada"),
            Tool::UnlockSpreadsheet
        );
    }

    #[test]
    fn test_find_in_text_no_match() {
        assert_eq!(Tool::find_in_text("NENHUMA"), Tool::None);
        assert_eq!(Tool::find_in_text("nada a fazer"), Tool::None);
    }

    #[test]
    fn test_from_cli_name() {
        assert_eq!(
            Tool::from_cli_name("reconnect-network"),
            Some(Tool::ReconnectNetwork)
        );
        assert_eq!(Tool::from_cli_name(" Clear-Cache "), Some(Tool::ClearCache));
        assert_eq!(Tool::from_cli_name("planilha"), Some(Tool::UnlockSpreadsheet));
        assert_eq!(Tool::from_cli_name("unknown"), None);
    }
}
