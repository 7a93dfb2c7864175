//! Spreadsheet unlock pipeline.
//!
//! A fixed six-stage sequence: validate the file, terminate the editor,
//! remove the sibling lock file, strip the download-origin marker, purge
//! the Office cache and probe the file server. Only validation aborts the
//! run; every later stage always executes, and fatal failures are
//! collected as warnings on an otherwise successful run so the user sees
//! "concluído com avisos" instead of a hard stop.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{EventKind, EventSender};
use crate::probe;

/// Prefix of the sibling lock file the editor leaves next to the target.
pub const LOCK_FILE_PREFIX: &str = "~$";

/// Extensions accepted by the validation stage.
pub const SPREADSHEET_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "xlsm"];

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub succeeded: bool,
    pub message: String,
    /// Whether a failure of this stage counts against the final verdict.
    /// Non-fatal failures are recorded and the pipeline moves on.
    pub fatal: bool,
}

impl StepOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            fatal: false,
        }
    }

    fn fatal_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            fatal: true,
        }
    }

    fn advisory_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            fatal: false,
        }
    }
}

/// Final pipeline verdict.
///
/// `succeeded` with a non-empty `errors` list means "completed with
/// warnings"; `succeeded == false` only happens when validation rejected
/// the target outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResult {
    pub succeeded: bool,
    pub summary: String,
    /// Stage messages in execution order
    pub completed_steps: Vec<String>,
    /// Messages of fatal, unsuccessful stages
    pub errors: Vec<String>,
}

impl RepairResult {
    pub fn has_warnings(&self) -> bool {
        self.succeeded && !self.errors.is_empty()
    }

    fn aborted(summary: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            summary: summary.into(),
            completed_steps: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// The unlock pipeline and its fixed collaborators.
#[derive(Debug, Clone)]
pub struct RepairPipeline {
    editor_process: String,
    cache_dir: PathBuf,
    server_addr: String,
    probe_timeout: Duration,
}

impl RepairPipeline {
    pub fn new(
        editor_process: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        server_addr: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            editor_process: editor_process.into(),
            cache_dir: cache_dir.into(),
            server_addr: server_addr.into(),
            probe_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.repair.editor_process.clone(),
            config.repair.cache_dir.clone(),
            config.server.addr(),
            config.server.probe_timeout(),
        )
    }

    /// Run the pipeline against `target`, emitting log lines and progress
    /// checkpoints as each stage completes. Never panics and never returns
    /// early after validation passes.
    pub async fn run(&self, target: &Path, events: &EventSender) -> RepairResult {
        let mut completed: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        events.log("Validando arquivo...");
        events.progress(0.05);

        if !is_spreadsheet(target) {
            let summary = "Arquivo inválido ou não é uma planilha Excel";
            warn!("Validation rejected {}", target.display());
            events.log(summary);
            let result = RepairResult::aborted(summary);
            events.emit(EventKind::RepairFinished {
                result: result.clone(),
            });
            return result;
        }
        completed.push(format!("Arquivo validado: {}", file_name(target)));

        events.log("Etapa 1/5: Fechando instâncias do editor...");
        events.progress(0.15);
        let outcome = self.close_editor().await;
        record(outcome, &mut completed, &mut errors, events);

        events.log("Etapa 2/5: Removendo arquivo de bloqueio (~$)...");
        events.progress(0.35);
        let outcome = self.remove_lock_file(target);
        record(outcome, &mut completed, &mut errors, events);

        events.log("Etapa 3/5: Removendo bloqueio de origem...");
        events.progress(0.50);
        let outcome = self.remove_origin_marker(target);
        record(outcome, &mut completed, &mut errors, events);

        events.log("Etapa 4/5: Limpando cache do Office...");
        events.progress(0.70);
        let outcome = self.purge_cache();
        record(outcome, &mut completed, &mut errors, events);

        events.log("Etapa 5/5: Testando conectividade com o servidor...");
        events.progress(0.90);
        let outcome = self.probe_server().await;
        record(outcome, &mut completed, &mut errors, events);

        events.progress(1.0);

        let summary = if errors.is_empty() {
            "Planilha reparada com sucesso"
        } else {
            "Reparo concluído com alguns avisos"
        };
        info!("Repair of {} finished: {}", target.display(), summary);
        events.log(summary);

        let result = RepairResult {
            succeeded: true,
            summary: summary.to_string(),
            completed_steps: completed,
            errors,
        };
        events.emit(EventKind::RepairFinished {
            result: result.clone(),
        });
        result
    }

    /// Stage 1: best-effort kill of the editor. A process that was not
    /// running counts as success.
    async fn close_editor(&self) -> StepOutcome {
        let result = if cfg!(windows) {
            Command::new("taskkill")
                .args(["/f", "/im", &self.editor_process])
                .output()
                .await
        } else {
            Command::new("pkill")
                .args(["-x", &self.editor_process])
                .output()
                .await
        };

        match result {
            Ok(out) if out.status.success() => StepOutcome::ok("Editor fechado com sucesso"),
            // Nonzero exit: nothing matched the process name.
            Ok(_) => StepOutcome::ok("Nenhuma instância do editor em execução"),
            Err(e) if e.kind() == ErrorKind::NotFound => StepOutcome::advisory_failure(format!(
                "Comando de encerramento indisponível: {e}"
            )),
            Err(e) => {
                StepOutcome::fatal_failure(format!("Não foi possível fechar o editor: {e}"))
            }
        }
    }

    /// Stage 2: delete the `~$<name>` sibling lock file. Absence is
    /// success; present-but-undeletable blocks a clean verdict.
    fn remove_lock_file(&self, target: &Path) -> StepOutcome {
        let lock = lock_path(target);
        let lock_name = file_name(&lock);

        if !lock.exists() {
            return StepOutcome::ok("Nenhum arquivo de bloqueio encontrado");
        }
        match fs::remove_file(&lock) {
            Ok(()) => StepOutcome::ok(format!("Arquivo de bloqueio removido: {lock_name}")),
            Err(e) => {
                warn!("Could not remove lock file {}: {}", lock.display(), e);
                StepOutcome::fatal_failure(format!("Não foi possível remover: {lock_name}"))
            }
        }
    }

    /// Stage 3: strip the download-origin marker (the Zone.Identifier
    /// alternate data stream). Always non-fatal; on filesystems without
    /// ADS the path simply does not exist.
    fn remove_origin_marker(&self, target: &Path) -> StepOutcome {
        let mut ads = target.as_os_str().to_os_string();
        ads.push(":Zone.Identifier");

        match fs::remove_file(PathBuf::from(ads)) {
            Ok(()) => StepOutcome::ok("Bloqueio de origem removido"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                StepOutcome::ok("Arquivo não possui bloqueio de origem")
            }
            Err(e) => StepOutcome::advisory_failure(format!(
                "Não foi possível remover o bloqueio de origem: {e}"
            )),
        }
    }

    /// Stage 4: delete the regular files directly inside the Office cache
    /// directory. Files in use are skipped silently; a missing directory
    /// is success.
    fn purge_cache(&self) -> StepOutcome {
        if !self.cache_dir.exists() {
            return StepOutcome::ok("Pasta de cache não encontrada (OK)");
        }

        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => return StepOutcome::advisory_failure(format!("Erro ao limpar cache: {e}")),
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            StepOutcome::ok(format!("Cache limpo: {removed} arquivo(s) removido(s)"))
        } else {
            StepOutcome::ok("Cache já estava limpo")
        }
    }

    /// Stage 5: the file server must answer for the spreadsheet on the
    /// share to be usable again.
    async fn probe_server(&self) -> StepOutcome {
        if probe::is_reachable(&self.server_addr, self.probe_timeout).await {
            StepOutcome::ok(format!("Servidor {} acessível", self.server_addr))
        } else {
            StepOutcome::fatal_failure(format!("Servidor {} não respondeu", self.server_addr))
        }
    }
}

fn record(
    outcome: StepOutcome,
    completed: &mut Vec<String>,
    errors: &mut Vec<String>,
    events: &EventSender,
) {
    events.log(outcome.message.clone());
    completed.push(outcome.message.clone());
    if !outcome.succeeded && outcome.fatal {
        errors.push(outcome.message);
    }
}

/// Path of the sibling lock file for a spreadsheet.
pub fn lock_path(target: &Path) -> PathBuf {
    let name = format!("{LOCK_FILE_PREFIX}{}", file_name(target));
    match target.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SPREADSHEET_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        dir: TempDir,
        target: PathBuf,
        cache_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Relatorio.xlsx");
        fs::write(&target, b"planilha").unwrap();
        let cache_dir = dir.path().join("OfficeFileCache");
        fs::create_dir(&cache_dir).unwrap();
        Fixture {
            dir,
            target,
            cache_dir,
        }
    }

    async fn live_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn pipeline(fx: &Fixture, server_addr: &str) -> RepairPipeline {
        RepairPipeline::new(
            // A name that never matches a running process, so the kill
            // stage takes the "nothing to close" path.
            "processo-inexistente-suporte",
            fx.cache_dir.clone(),
            server_addr,
            Duration::from_secs(1),
        )
    }

    fn drain_progress(rx: &mut UnboundedReceiver<crate::events::EngineEvent>) -> Vec<f64> {
        let mut fractions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EventKind::Progress { fraction } = event.kind {
                fractions.push(fraction);
            }
        }
        fractions
    }

    #[tokio::test]
    async fn test_missing_target_aborts_with_no_steps() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;
        let events = EventSender::discard();

        let result = pipeline(&fx, &addr)
            .run(&fx.dir.path().join("nao-existe.xlsx"), &events)
            .await;

        assert!(!result.succeeded);
        assert!(result.completed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_extension_aborts() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;
        let bogus = fx.dir.path().join("notas.txt");
        fs::write(&bogus, b"nada").unwrap();
        let events = EventSender::discard();

        let result = pipeline(&fx, &addr).run(&bogus, &events).await;

        assert!(!result.succeeded);
        assert!(result.completed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_clean_run_removes_lock_and_purges_cache() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;

        let lock = lock_path(&fx.target);
        fs::write(&lock, b"lock").unwrap();
        fs::write(fx.cache_dir.join("a.tmp"), b"x").unwrap();
        fs::write(fx.cache_dir.join("b.tmp"), b"y").unwrap();

        let events = EventSender::discard();
        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        assert!(result.succeeded, "errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
        assert!(!result.has_warnings());
        assert!(!lock.exists());
        assert_eq!(fs::read_dir(&fx.cache_dir).unwrap().count(), 0);
        // validation + 5 stages
        assert_eq!(result.completed_steps.len(), 6);
        assert!(result.completed_steps[0].contains("Relatorio.xlsx"));
    }

    #[tokio::test]
    async fn test_absent_lock_file_is_success() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;
        let events = EventSender::discard();

        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        assert!(result.succeeded);
        assert!(result
            .completed_steps
            .iter()
            .any(|s| s.contains("Nenhum arquivo de bloqueio")));
    }

    #[tokio::test]
    async fn test_undeletable_lock_is_fatal_but_run_continues() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;

        // A directory at the lock path: remove_file fails on it.
        fs::create_dir(lock_path(&fx.target)).unwrap();

        let events = EventSender::discard();
        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        // Completed with warnings, not aborted.
        assert!(result.succeeded);
        assert!(result.has_warnings());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Não foi possível remover"));
        assert_eq!(result.completed_steps.len(), 6);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_the_only_error() {
        let fx = fixture();
        let (listener, addr) = live_server().await;
        drop(listener);

        let events = EventSender::discard();
        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        assert!(result.succeeded);
        assert!(result.has_warnings());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("não respondeu"));
    }

    #[tokio::test]
    async fn test_missing_cache_dir_is_success() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;
        fs::remove_dir(&fx.cache_dir).unwrap();

        let events = EventSender::discard();
        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        assert!(result.succeeded);
        assert!(result
            .completed_steps
            .iter()
            .any(|s| s.contains("Pasta de cache não encontrada")));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_one() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;

        let (events, mut rx) = EventSender::channel();
        let _ = pipeline(&fx, &addr).run(&fx.target, &events).await;

        let fractions = drain_progress(&mut rx);
        assert!(!fractions.is_empty());
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_repair_finished_event_is_emitted() {
        let fx = fixture();
        let (_listener, addr) = live_server().await;

        let (events, mut rx) = EventSender::channel();
        let result = pipeline(&fx, &addr).run(&fx.target, &events).await;

        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            if let EventKind::RepairFinished { result } = event.kind {
                finished = Some(result);
            }
        }
        let finished = finished.expect("RepairFinished event");
        assert_eq!(finished.succeeded, result.succeeded);
        assert_eq!(finished.summary, result.summary);
    }

    #[test]
    fn test_lock_path_naming() {
        let lock = lock_path(Path::new("/dados/planilhas/Custos.xlsx"));
        assert_eq!(
            lock,
            PathBuf::from("/dados/planilhas/~$Custos.xlsx")
        );
    }
}
