use crate::config::EncryptionConfig;
use crate::error::TransformError;
use bytes::{Bytes, BytesMut};

/// Length of the header prepended to encrypted content, also the number of XORed bytes
pub const HEADER_LENGTH: usize = 16;

/// Verifies and strips the header of encrypted content, then undoes the XOR on the bytes
/// following it. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct ByteTransform {
    header: [u8; HEADER_LENGTH],
    key: [u8; HEADER_LENGTH],
    encrypted_images: bool,
    ignore_list: Vec<String>,
}

impl ByteTransform {
    pub fn new(config: &EncryptionConfig) -> Result<Self, TransformError> {
        let header_hex = format!("{}{}{}", config.signature, config.version, config.remain);
        Ok(Self {
            header: parse_header(&header_hex)?,
            key: parse_key(&config.key)?,
            encrypted_images: config.encrypted_images,
            ignore_list: config.ignore_list.clone(),
        })
    }

    pub fn header(&self) -> &[u8; HEADER_LENGTH] {
        &self.header
    }

    /// Whether `url` is shipped in plain form regardless of the install's encryption
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignore_list.iter().any(|ignored| ignored == url)
    }

    /// Whether the content behind `url` has to go through [`ByteTransform::decrypt`]
    pub fn should_transform(&self, url: &str) -> bool {
        self.encrypted_images && !self.is_ignored(url)
    }

    pub fn decrypt(&self, bytes: &[u8]) -> Result<Bytes, TransformError> {
        if bytes.len() < HEADER_LENGTH || bytes[..HEADER_LENGTH] != self.header {
            return Err(TransformError::CorruptHeader {
                expected: self.header,
                found: bytes[..bytes.len().min(HEADER_LENGTH)].to_vec(),
            });
        }
        let mut body = BytesMut::from(&bytes[HEADER_LENGTH..]);
        self.xor(&mut body);
        Ok(body.freeze())
    }

    /// Inverse of [`ByteTransform::decrypt`]
    pub fn encrypt(&self, bytes: &[u8]) -> Bytes {
        let mut body = BytesMut::from(bytes);
        self.xor(&mut body);
        let mut out = BytesMut::with_capacity(HEADER_LENGTH + body.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&body);
        out.freeze()
    }

    fn xor(&self, body: &mut [u8]) {
        body.iter_mut()
            .zip(self.key.iter())
            .for_each(|(byte, key)| *byte ^= key);
    }
}

/// Path the encrypted form of `url` is shipped under
pub fn encrypted_url(url: &str) -> String {
    let Some((stem, extension)) = url.rsplit_once('.') else {
        return url.to_string();
    };
    let encrypted = match extension {
        "png" => "rpgmvp",
        "ogg" => "rpgmvo",
        "m4a" => "rpgmvm",
        _ => return url.to_string(),
    };
    format!("{stem}.{encrypted}")
}

fn parse_header(hex: &str) -> Result<[u8; HEADER_LENGTH], TransformError> {
    let invalid = || TransformError::InvalidHeaderHex(hex.to_string());
    if hex.len() != HEADER_LENGTH * 2 || !hex.is_ascii() {
        return Err(invalid());
    }
    let mut header = [0u8; HEADER_LENGTH];
    for (index, byte) in header.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(header)
}

/// Each of the first 16 characters is one hex digit, XORed into the byte at the same position
fn parse_key(key: &str) -> Result<[u8; HEADER_LENGTH], TransformError> {
    let mut parsed = [0u8; HEADER_LENGTH];
    let mut digits = key.chars().map(|c| c.to_digit(16));
    for byte in parsed.iter_mut() {
        match digits.next() {
            Some(Some(digit)) => *byte = digit as u8,
            _ => return Err(TransformError::InvalidKey(key.to_string())),
        }
    }
    Ok(parsed)
}
