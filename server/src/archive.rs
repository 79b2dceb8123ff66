//! Verzeichnis-Download: Packen in ein temporaeres tar.gz-Archiv

use std::io;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

/// Gepacktes Verzeichnis; die Datei wird beim Drop entfernt
#[derive(Debug)]
pub struct Archiv {
    pub name: String,
    pub datei: NamedTempFile,
}

impl Archiv {
    pub fn pfad(&self) -> &Path {
        self.datei.path()
    }
}

/// Packt `verzeichnis` rekursiv nach `<name>.tar.gz`
///
/// Blockiert; aus async-Code ueber `spawn_blocking` aufrufen. Symlinks werden
/// als Links archiviert und nicht verfolgt.
pub fn verzeichnis_packen(verzeichnis: &Path) -> io::Result<Archiv> {
    let basis = verzeichnis
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "home".to_string());

    let datei = tempfile::Builder::new()
        .prefix("deskproxy-")
        .suffix(".tar.gz")
        .tempfile()?;

    let encoder = GzEncoder::new(datei.as_file().try_clone()?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(&basis, verzeichnis)?;
    builder.into_inner()?.finish()?.sync_all()?;

    tracing::debug!(
        verzeichnis = %verzeichnis.display(),
        archiv = %datei.path().display(),
        "Verzeichnis gepackt"
    );

    Ok(Archiv {
        name: format!("{basis}.tar.gz"),
        datei,
    })
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn verzeichnis_wird_vollstaendig_gepackt() {
        let home = tempfile::tempdir().unwrap();
        let docs = home.path().join("docs");
        std::fs::create_dir_all(docs.join("unter")).unwrap();
        std::fs::write(docs.join("a.txt"), b"hallo").unwrap();
        std::fs::write(docs.join("unter/b.txt"), b"welt").unwrap();

        let archiv = verzeichnis_packen(&docs).unwrap();
        assert_eq!(archiv.name, "docs.tar.gz");

        let datei = std::fs::File::open(archiv.pfad()).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(datei));
        let mut inhalte = Vec::new();
        for eintrag in tar.entries().unwrap() {
            let mut eintrag = eintrag.unwrap();
            let pfad = eintrag.path().unwrap().to_string_lossy().into_owned();
            if eintrag.header().entry_type().is_file() {
                let mut text = String::new();
                eintrag.read_to_string(&mut text).unwrap();
                inhalte.push((pfad, text));
            }
        }
        inhalte.sort();
        assert_eq!(
            inhalte,
            vec![
                ("docs/a.txt".to_string(), "hallo".to_string()),
                ("docs/unter/b.txt".to_string(), "welt".to_string()),
            ]
        );
    }

    #[test]
    fn temporaere_datei_wird_entfernt() {
        let home = tempfile::tempdir().unwrap();
        let archiv = verzeichnis_packen(home.path()).unwrap();
        let pfad = archiv.pfad().to_path_buf();
        assert!(pfad.exists());
        drop(archiv);
        assert!(!pfad.exists());
    }
}
