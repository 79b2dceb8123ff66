//! Erkennung des Content-Types anhand der ersten Bytes einer Datei

/// Anzahl Bytes, die fuer die Erkennung betrachtet werden
pub const SNIFF_LAENGE: usize = 512;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Feste Signaturen am Dateianfang
const SIGNATUREN: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"\x1a\x45\xdf\xa3", "video/webm"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x7fELF", OCTET_STREAM),
    (b"\xef\xbb\xbf", TEXT_PLAIN),
    (b"\xfe\xff", "text/plain; charset=utf-16be"),
    (b"\xff\xfe", "text/plain; charset=utf-16le"),
];

/// Auszeichnungssprachen, Gross-/Kleinschreibung egal, nach fuehrendem Leerraum
const HTML_ANFAENGE: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Bestimmt den Content-Type; leere Daten gelten als Text
pub fn content_type_erkennen(daten: &[u8]) -> &'static str {
    let daten = &daten[..daten.len().min(SNIFF_LAENGE)];
    if daten.is_empty() {
        return TEXT_PLAIN;
    }

    if let Some((_, typ)) = SIGNATUREN.iter().find(|(sig, _)| daten.starts_with(sig)) {
        return *typ;
    }

    // RIFF-Container: Typ steht an Offset 8
    if daten.len() >= 12 && daten.starts_with(b"RIFF") {
        match &daten[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            b"AVI " => return "video/avi",
            _ => {}
        }
    }

    let text = trim_anfang(daten);
    if HTML_ANFAENGE.iter().any(|anfang| html_tag(text, anfang)) {
        return "text/html; charset=utf-8";
    }
    if text.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if daten.iter().any(|&b| ist_binaer(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn trim_anfang(daten: &[u8]) -> &[u8] {
    let start = daten
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(daten.len());
    &daten[start..]
}

/// Tag muss von Leerzeichen oder `>` abgeschlossen sein
fn html_tag(text: &[u8], anfang: &[u8]) -> bool {
    if text.len() <= anfang.len() || !text[..anfang.len()].eq_ignore_ascii_case(anfang) {
        return false;
    }
    matches!(text[anfang.len()], b' ' | b'>')
}

fn ist_binaer(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leere_datei_ist_text() {
        assert_eq!(content_type_erkennen(b""), TEXT_PLAIN);
    }

    #[test]
    fn bekannte_signaturen() {
        assert_eq!(content_type_erkennen(b"%PDF-1.7\n..."), "application/pdf");
        assert_eq!(content_type_erkennen(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "image/png");
        assert_eq!(content_type_erkennen(b"\x1f\x8b\x08\0\0\0"), "application/x-gzip");
        assert_eq!(content_type_erkennen(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(content_type_erkennen(b"RIFF\0\0\0\0WAVEfmt "), "audio/wave");
    }

    #[test]
    fn html_und_xml() {
        assert_eq!(
            content_type_erkennen(b"  \n<!doctype html>\n<html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_erkennen(b"<p>Hallo</p>"), "text/html; charset=utf-8");
        assert_eq!(
            content_type_erkennen(b"<?xml version=\"1.0\"?><a/>"),
            "text/xml; charset=utf-8"
        );
        // `<pre` ist kein `<p`-Tag
        assert_eq!(content_type_erkennen(b"<pre-formatted"), TEXT_PLAIN);
    }

    #[test]
    fn text_und_binaerdaten() {
        assert_eq!(content_type_erkennen("Grüße aus dem Home\n".as_bytes()), TEXT_PLAIN);
        assert_eq!(content_type_erkennen(&[0x10, 0x00, 0x42, 0x99]), OCTET_STREAM);
    }

    #[test]
    fn nur_der_anfang_zaehlt() {
        let mut daten = vec![b'a'; SNIFF_LAENGE];
        daten.push(0x00);
        assert_eq!(content_type_erkennen(&daten), TEXT_PLAIN);
    }
}
