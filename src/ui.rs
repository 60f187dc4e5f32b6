//! Interface de terminal: spinner de progresso e linhas coloridas por job.
//!
//! Usa as crates `indicatif` para o spinner e `console` para cores. O
//! [`BatchProgress`] é dono exclusivo do collector do pool, então todas as
//! linhas são impressas a partir de uma única task.

use std::io::{self, Write};
use std::sync::Mutex;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Indicador visual de um lote de operações em domínios.
///
/// Exibe um spinner com a contagem de jobs concluídos e uma linha por job:
/// verde para sucesso, vermelho para falha, amarelo para simulação.
pub struct BatchProgress {
    // Spinner do indicatif; oculto quando não há terminal.
    pb: ProgressBar,
    // Destino das linhas; escrito mesmo com o spinner oculto.
    out: Mutex<Box<dyn Write + Send>>,
    green: Style,
    red: Style,
    yellow: Style,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::hidden()
    }
}

impl BatchProgress {
    /// Inicia um spinner visível com o rótulo do lote.
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} ({pos} done)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::with_bar(pb, Box::new(io::stdout()))
    }

    /// Progresso sem spinner; as linhas vão para stdout.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden(), Box::new(io::stdout()))
    }

    /// Sem spinner, com as linhas escritas em `out`.
    #[cfg(test)]
    pub fn writing_to(out: Box<dyn Write + Send>) -> Self {
        Self::with_bar(ProgressBar::hidden(), out)
    }

    fn with_bar(pb: ProgressBar, out: Box<dyn Write + Send>) -> Self {
        Self {
            pb,
            out: Mutex::new(out),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    // O spinner é suspenso enquanto a linha é escrita.
    fn line(&self, text: String) {
        self.pb.suspend(|| {
            let Ok(mut out) = self.out.lock() else {
                return;
            };
            if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
                tracing::warn!(error = %e, "could not write progress line");
            }
        });
    }

    pub fn success(&self, action: &str, name: &str) {
        self.line(format!("  {} {action} {name}", self.green.apply_to("✓")));
        self.pb.inc(1);
    }

    pub fn failure(&self, action: &str, name: &str, error: &str) {
        self.line(format!(
            "  {} {action} {name}: {error}",
            self.red.apply_to("✗")
        ));
        self.pb.inc(1);
    }

    /// Linha de simulação (`--dry-run`); não conta como job concluído.
    pub fn planned(&self, action: &str, name: &str) {
        self.line(format!(
            "  {} would {action} {name}",
            self.yellow.apply_to("~")
        ));
    }

    /// Finaliza o spinner e imprime o resumo do lote.
    pub fn finish(&self, succeeded: usize, failed: usize) {
        self.pb.finish_and_clear();
        if failed == 0 {
            self.line(
                self.green
                    .apply_to(format!("{succeeded} operations completed"))
                    .to_string(),
            );
        } else {
            self.line(
                self.red
                    .apply_to(format!(
                        "{succeeded} operations completed, {failed} failed"
                    ))
                    .to_string(),
            );
        }
    }
}

/// Buffer compartilhado para capturar a saída nos testes.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct CapturedOutput(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedOutput {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[cfg(test)]
impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
