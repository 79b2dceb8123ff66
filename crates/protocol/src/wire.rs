//! Wire-Primitive des Proxy-Protokolls
//!
//! Es gibt keine Rahmung und keine Versionsnummer. Alle Nachrichten setzen
//! sich aus drei Primitiven zusammen:
//!
//! ```text
//! Byte    : 1 Byte
//! String  : UTF-8 Bytes, abgeschlossen mit '\n' (0x0A)
//! Int64   : 8 Bytes little-endian (Bitmuster eines i64)
//! ```
//!
//! Strings duerfen selbst kein `\n` enthalten und sind auf
//! [`MAX_STRING_LAENGE`] Bytes begrenzt.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Abschlusszeichen jeder Zeichenkette
pub const STRING_ENDE: u8 = b'\n';

/// Maximale Laenge einer Zeichenkette ohne Abschlusszeichen (64 KiB)
pub const MAX_STRING_LAENGE: usize = 64 * 1024;

/// Liest genau ein Byte
pub async fn read_byte<R>(leser: &mut R) -> ProtocolResult<u8>
where
    R: AsyncRead + Unpin + ?Sized,
{
    Ok(leser.read_u8().await?)
}

/// Liest eine mit `\n` abgeschlossene Zeichenkette (ohne das `\n`)
///
/// Endet der Datenstrom vor dem Abschlusszeichen, ist das ein Fehler.
pub async fn read_string<R>(leser: &mut R) -> ProtocolResult<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut puffer = Vec::new();
    let limit = (MAX_STRING_LAENGE + 1) as u64;
    let gelesen = (&mut *leser).take(limit).read_until(STRING_ENDE, &mut puffer).await?;

    match puffer.last() {
        Some(&STRING_ENDE) => {
            puffer.pop();
        }
        _ if gelesen as u64 >= limit => {
            return Err(ProtocolError::ZeichenketteZuLang {
                max: MAX_STRING_LAENGE,
            })
        }
        _ => return Err(ProtocolError::UnvollstaendigeZeichenkette),
    }

    Ok(String::from_utf8(puffer)?)
}

/// Liest einen vorzeichenbehafteten 64-Bit-Wert (little-endian)
pub async fn read_int64<R>(leser: &mut R) -> ProtocolResult<i64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    Ok(leser.read_i64_le().await?)
}

/// Schreibt genau ein Byte
pub async fn write_byte<W>(schreiber: &mut W, byte: u8) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    schreiber.write_u8(byte).await?;
    Ok(())
}

/// Schreibt eine Zeichenkette gefolgt von `\n` in einem einzigen Schreibvorgang
pub async fn write_string<W>(schreiber: &mut W, wert: &str) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    string_pruefen(wert)?;
    let mut puffer = Vec::with_capacity(wert.len() + 1);
    puffer.extend_from_slice(wert.as_bytes());
    puffer.push(STRING_ENDE);
    schreiber.write_all(&puffer).await?;
    Ok(())
}

/// Schreibt einen vorzeichenbehafteten 64-Bit-Wert (little-endian)
pub async fn write_int64<W>(schreiber: &mut W, wert: i64) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    schreiber.write_i64_le(wert).await?;
    Ok(())
}

/// Lehnt Zeichenketten ab, die sich nicht eindeutig uebertragen lassen
pub fn string_pruefen(wert: &str) -> ProtocolResult<()> {
    if wert.as_bytes().contains(&STRING_ENDE) {
        return Err(ProtocolError::ZeilenumbruchImArgument);
    }
    if wert.len() > MAX_STRING_LAENGE {
        return Err(ProtocolError::ZeichenketteZuLang {
            max: MAX_STRING_LAENGE,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
