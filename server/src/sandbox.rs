//! Home-Sandbox fuer Dateizugriffe
//!
//! Alle Pfade aus FStat/FGet/FPut sind relativ zum Home-Verzeichnis der
//! Desktop-Sitzung. Die Aufloesung ist rein lexikalisch: der Zielpfad wird
//! vor der Pruefung nicht angefasst, ein `..` oberhalb des Home-Verzeichnisses
//! erreicht also nie das Dateisystem.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Dateiuebertragung ist fuer diese Desktop-Sitzung deaktiviert")]
    Deaktiviert,

    #[error("{0} liegt ausserhalb des Home-Verzeichnisses")]
    Ausserhalb(String),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Loest Client-Pfade in lokale Pfade auf
pub trait PathResolver: Send + Sync {
    fn aufloesen(&self, relativ: &str) -> SandboxResult<PathBuf>;
}

/// Sandbox mit dem Home-Verzeichnis als Wurzel
#[derive(Debug, Clone)]
pub struct HomeSandbox {
    home: PathBuf,
}

impl HomeSandbox {
    pub fn neu(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl PathResolver for HomeSandbox {
    fn aufloesen(&self, relativ: &str) -> SandboxResult<PathBuf> {
        if !self.home.is_dir() {
            return Err(SandboxError::Deaktiviert);
        }

        let mut pfad = self.home.clone();
        let mut tiefe = 0usize;
        for komponente in Path::new(relativ).components() {
            match komponente {
                // Absolute Pfade gelten ebenfalls relativ zum Home
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if tiefe == 0 {
                        return Err(SandboxError::Ausserhalb(relativ.to_string()));
                    }
                    pfad.pop();
                    tiefe -= 1;
                }
                Component::Normal(teil) => {
                    pfad.push(teil);
                    tiefe += 1;
                }
            }
        }
        Ok(pfad)
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, HomeSandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = HomeSandbox::neu(dir.path());
        (dir, sandbox)
    }

    #[test]
    fn relative_pfade_landen_im_home() {
        let (dir, sandbox) = sandbox();
        assert_eq!(sandbox.aufloesen("docs/a.txt").unwrap(), dir.path().join("docs/a.txt"));
        assert_eq!(sandbox.aufloesen("./docs/../b").unwrap(), dir.path().join("b"));
        assert_eq!(sandbox.aufloesen("").unwrap(), dir.path());
    }

    #[test]
    fn absolute_pfade_bleiben_im_home() {
        let (dir, sandbox) = sandbox();
        assert_eq!(sandbox.aufloesen("/etc/passwd").unwrap(), dir.path().join("etc/passwd"));
    }

    #[test]
    fn ausbruch_wird_abgelehnt() {
        let (_dir, sandbox) = sandbox();
        assert_eq!(
            sandbox.aufloesen("../etc/passwd"),
            Err(SandboxError::Ausserhalb("../etc/passwd".into()))
        );
        assert!(sandbox.aufloesen("docs/../../x").is_err());
        assert!(sandbox.aufloesen("/../x").is_err());
    }

    #[test]
    fn fehlendes_home_deaktiviert_uebertragung() {
        let sandbox = HomeSandbox::neu("/nicht/vorhanden/home");
        let fehler = sandbox.aufloesen("a.txt").unwrap_err();
        assert_eq!(fehler, SandboxError::Deaktiviert);
        assert_eq!(
            fehler.to_string(),
            "Dateiuebertragung ist fuer diese Desktop-Sitzung deaktiviert"
        );
    }
}
