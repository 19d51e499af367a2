//! AT command vocabulary used by the driver.

/// Appended to every command line.
pub const LINE_TERMINATOR: &str = "\r";

/// Ends message composition after an `AT+CMGS` prompt (Ctrl-Z).
pub const CTRL_Z: u8 = 0x1A;

/// Aborts message composition (ESC).
pub const ESC: u8 = 0x1B;

/// Liveness check.
pub const ATTENTION: &str = "AT";
/// Disable command echo.
pub const ECHO_OFF: &str = "ATE0";
/// Select text-mode message format.
pub const TEXT_MODE: &str = "AT+CMGF=1";
/// Route new-message indications to the terminal as `+CMTI` lines.
pub const ROUTE_INDICATIONS: &str = "AT+CNMI=2,1,0,0,0";
/// List unread stored messages.
pub const LIST_UNREAD: &str = "AT+CMGL=\"REC UNREAD\"";
/// Signal quality.
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
/// Network registration status.
pub const REGISTRATION: &str = "AT+CREG?";

/// Startup sequence, in order.
pub const INIT_SEQUENCE: [&str; 4] = [ATTENTION, ECHO_OFF, TEXT_MODE, ROUTE_INDICATIONS];

/// Fetch the stored message at `index`.
pub fn read_message(index: u32) -> String {
    format!("AT+CMGR={}", index)
}

/// Begin composing a message to `number`.
pub fn compose(number: &str) -> String {
    format!("AT+CMGS=\"{}\"", number)
}

/// Frame a command for the wire.
pub fn frame(command: &str) -> Vec<u8> {
    let mut bytes = command.trim().as_bytes().to_vec();
    bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
    bytes
}

/// Frame a message body followed by the composition terminator.
pub fn frame_body(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(CTRL_Z);
    bytes
}
