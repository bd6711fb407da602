//! The fixed row schema: `id: u32`, `username: [u8; 32]`, `email: [u8; 255]`,
//! packed contiguously with no padding so the on-disk layout is byte-exact.
use crate::errors::Error;

pub const ID_SIZE: usize = std::mem::size_of::<u32>();
pub const USERNAME_SIZE: usize = 32;
pub const EMAIL_SIZE: usize = 255;

pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;
pub const ROW_SIZE: usize = EMAIL_OFFSET + EMAIL_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: [u8; USERNAME_SIZE],
    pub email: [u8; EMAIL_SIZE],
}

impl Row {
    /// Builds a row from parsed statement fields, rejecting strings that
    /// don't fit the fixed-width buffers.
    ///
    /// spec.md §9 leaves this ambiguous ("an implementer may either reject
    /// ... or mirror the source's silent truncation"); this crate rejects,
    /// since a clear error is more defensible than silent data loss.
    pub fn new(id: u32, username: &str, email: &str) -> Result<Self, Error> {
        if username.len() > USERNAME_SIZE {
            return Err(Error::Parse(format!(
                "Username too long ({} bytes, max {})",
                username.len(),
                USERNAME_SIZE
            )));
        }
        if email.len() > EMAIL_SIZE {
            return Err(Error::Parse(format!(
                "Email too long ({} bytes, max {})",
                email.len(),
                EMAIL_SIZE
            )));
        }
        Ok(Row {
            id,
            username: str_to_fixed_bytes(username),
            email: str_to_fixed_bytes(email),
        })
    }

    /// Serializes the row into `dest[..ROW_SIZE]` at host byte order, with
    /// id at offset 0, username at offset 4, email at offset 36.
    pub fn serialize(&self, dest: &mut [u8]) {
        dest[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_ne_bytes());
        dest[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE].copy_from_slice(&self.username);
        dest[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE].copy_from_slice(&self.email);
    }

    /// Reads a row back out of a `ROW_SIZE`-byte slice.
    pub fn deserialize(src: &[u8]) -> Self {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&src[ID_OFFSET..ID_OFFSET + ID_SIZE]);

        let mut username = [0u8; USERNAME_SIZE];
        username.copy_from_slice(&src[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);

        let mut email = [0u8; EMAIL_SIZE];
        email.copy_from_slice(&src[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);

        Row {
            id: u32::from_ne_bytes(id_bytes),
            username,
            email,
        }
    }

    pub fn username_str(&self) -> String {
        bytes_to_str(&self.username)
    }

    pub fn email_str(&self) -> String {
        bytes_to_str(&self.email)
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.id, self.username_str(), self.email_str())
    }
}

fn str_to_fixed_bytes<const N: usize>(input: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = input.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn bytes_to_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_size_is_byte_exact() {
        assert_eq!(ROW_SIZE, 291);
        assert_eq!(ID_OFFSET, 0);
        assert_eq!(USERNAME_OFFSET, 4);
        assert_eq!(EMAIL_OFFSET, 36);
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let row = Row::new(7, "alice", "alice@example.com").unwrap();
        let mut buf = [0u8; ROW_SIZE];
        row.serialize(&mut buf);
        let back = Row::deserialize(&buf);
        assert_eq!(row, back);
    }

    #[test]
    fn accepts_max_length_strings() {
        let username = "a".repeat(USERNAME_SIZE);
        let email = "a".repeat(EMAIL_SIZE);
        assert!(Row::new(0, &username, &email).is_ok());
    }

    #[test]
    fn rejects_oversized_strings() {
        let username = "a".repeat(USERNAME_SIZE + 1);
        assert!(Row::new(0, &username, "x@example.com").is_err());
    }
}
