//! Blocking baselines: one direct `send`/`recv` syscall per buffer, and the
//! `std::io` equivalents.

use crate::error::{TransportError, TransportResult};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Write `buf` with a single `send(2)` call.
pub fn posix_write<S: AsRawFd>(socket: &S, buf: &[u8]) -> TransportResult<()> {
    // SAFETY: the pointer and length describe `buf`, which outlives the call,
    // and the descriptor is owned by `socket`.
    let sent = unsafe {
        libc::send(
            socket.as_raw_fd(),
            buf.as_ptr().cast::<libc::c_void>(),
            buf.len(),
            SEND_FLAGS,
        )
    };
    check_transfer("send", sent, buf.len())
}

/// Fill `buf` with a single `recv(2)` call.
pub fn posix_read<S: AsRawFd>(socket: &S, buf: &mut [u8]) -> TransportResult<()> {
    // SAFETY: the pointer and length describe `buf`, which is exclusively
    // borrowed for the duration of the call.
    let received = unsafe {
        libc::recv(
            socket.as_raw_fd(),
            buf.as_mut_ptr().cast::<libc::c_void>(),
            buf.len(),
            0,
        )
    };
    if received == 0 && !buf.is_empty() {
        return Err(TransportError::ConnectionClosed);
    }
    check_transfer("recv", received, buf.len())
}

fn check_transfer(operation: &'static str, result: isize, expected: usize) -> TransportResult<()> {
    if result < 0 {
        return Err(io::Error::last_os_error().into());
    }
    let actual = result as usize;
    if actual != expected {
        return Err(TransportError::ShortTransfer {
            operation,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Write all of `buf` through `std::io::Write`.
pub fn stream_write<W: Write>(stream: &mut W, buf: &[u8]) -> TransportResult<()> {
    stream.write_all(buf)?;
    Ok(())
}

/// Fill `buf` through `std::io::Read`.
pub fn stream_read<R: Read>(stream: &mut R, buf: &mut [u8]) -> TransportResult<()> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
        _ => TransportError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::make_stream_socket_pair;
    use std::net::Shutdown;

    #[test]
    fn test_posix_exchange() {
        let (ping, pong) = make_stream_socket_pair().unwrap();
        posix_write(&ping, b"ping").unwrap();
        let mut buf = [0u8; 4];
        posix_read(&pong, &mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_posix_read_reports_short_transfer() {
        let (ping, pong) = make_stream_socket_pair().unwrap();
        posix_write(&ping, b"ab").unwrap();
        let mut buf = [0u8; 8];
        match posix_read(&pong, &mut buf) {
            Err(TransportError::ShortTransfer {
                operation,
                expected,
                actual,
            }) => {
                assert_eq!(operation, "recv");
                assert_eq!(expected, 8);
                assert_eq!(actual, 2);
            }
            other => panic!("expected a short transfer, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_read_maps_eof_to_connection_closed() {
        let (ping, mut pong) = make_stream_socket_pair().unwrap();
        ping.shutdown(Shutdown::Write).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            stream_read(&mut pong, &mut buf),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
