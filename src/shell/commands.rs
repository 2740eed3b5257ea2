//! Raw command bytes understood by the DWM1001 shell

/// Double carriage return: switches the UART from API mode to the shell
pub const WAKE: &[u8] = b"\x0D\x0D";

/// `lec`: toggles the CSV location stream, so it also pauses a running one
pub const PAUSE_STREAM: &[u8] = b"\x6C\x65\x63\x0D";

/// `si`: print system info
pub const SYSTEM_INFO: &[u8] = b"\x73\x69\x0D";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spelling() {
        assert_eq!(WAKE, b"\r\r");
        assert_eq!(PAUSE_STREAM, b"lec\r");
        assert_eq!(SYSTEM_INFO, b"si\r");
    }
}
