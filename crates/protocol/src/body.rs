//! Groessenbegrenzter Nutzdatenstrom
//!
//! Nachrichten mit Inhalt (`FGetResponse`, `FPutRequest`) enthalten nach dem
//! Kopf genau `Size` Rohbytes. [`Body`] liest genau diese Bytes aus der
//! darunterliegenden Quelle und meldet danach EOF. Endet die Quelle zu frueh,
//! liefert der Lesevorgang `UnexpectedEof`.
//!
//! Der Body besitzt die Quelle: clientseitig die ganze Verbindung,
//! serverseitig eine `&mut Connection`, deren Lebensdauer der Handler
//! verwaltet.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

/// Liest genau `groesse` Bytes aus `C`
#[derive(Debug)]
pub struct Body<C> {
    inner: Take<C>,
}

impl<C: AsyncRead + Unpin> Body<C> {
    pub fn neu(quelle: C, groesse: u64) -> Self {
        Self {
            inner: quelle.take(groesse),
        }
    }

    /// Noch nicht gelesene Bytes
    pub fn verbleibend(&self) -> u64 {
        self.inner.limit()
    }

    pub fn get_ref(&self) -> &C {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut C {
        self.inner.get_mut()
    }

    /// Gibt die Quelle zurueck, auch wenn noch Bytes ausstehen
    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for Body<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let vorher = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let nichts_gelesen = buf.filled().len() == vorher;
        if nichts_gelesen && buf.remaining() > 0 && this.inner.limit() > 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Datenstrom endete {} Bytes zu frueh", this.inner.limit()),
            )));
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn liest_genau_die_groesse() {
        let quelle = Cursor::new(b"0123456789rest".to_vec());
        let mut body = Body::neu(quelle, 10);

        let mut inhalt = Vec::new();
        body.read_to_end(&mut inhalt).await.unwrap();
        assert_eq!(inhalt, b"0123456789");
        assert_eq!(body.verbleibend(), 0);

        // Die Quelle steht direkt hinter dem Inhalt
        let mut rest = String::new();
        body.into_inner().read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "rest");
    }

    #[tokio::test]
    async fn zu_kurze_quelle_ist_fehler() {
        let quelle = Cursor::new(b"abc".to_vec());
        let mut body = Body::neu(quelle, 8);

        let mut inhalt = Vec::new();
        let fehler = body.read_to_end(&mut inhalt).await.unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(body.verbleibend(), 5);
    }

    #[tokio::test]
    async fn zugriff_auf_die_quelle() {
        let mut body = Body::neu(Cursor::new(b"kopf".to_vec()), 2);
        assert_eq!(body.get_ref().position(), 0);

        let mut erstes = [0u8; 1];
        body.read_exact(&mut erstes).await.unwrap();
        assert_eq!(body.get_mut().position(), 1);
        assert_eq!(body.verbleibend(), 1);
    }

    #[tokio::test]
    async fn leerer_inhalt() {
        let mut body = Body::neu(Cursor::new(Vec::new()), 0);
        let mut inhalt = Vec::new();
        assert_eq!(body.read_to_end(&mut inhalt).await.unwrap(), 0);
    }
}
