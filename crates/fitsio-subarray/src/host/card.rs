//! Header cards and block padding for the in-memory host.

use core::str;

use super::{HostResult, Status};

/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = b' ';

/// Returns the total byte length, in whole blocks, required to hold `num_bytes`.
pub const fn padded_byte_len(num_bytes: usize) -> usize {
    num_bytes.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// One 80-byte header record, kept verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct Card {
    raw: [u8; CARD_SIZE],
}

impl core::fmt::Debug for Card {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = str::from_utf8(&self.raw).unwrap_or("<non-ascii card>");
        f.debug_tuple("Card").field(&text.trim_end()).finish()
    }
}

impl Card {
    /// Wrap an existing record.
    pub fn from_raw(raw: [u8; CARD_SIZE]) -> Self {
        Card { raw }
    }

    fn with_value(keyword: &str, value: &str) -> Self {
        let mut raw = [HEADER_PAD_BYTE; CARD_SIZE];
        let kw = keyword.as_bytes();
        let kw_len = kw.len().min(8);
        raw[..kw_len].copy_from_slice(&kw[..kw_len]);
        raw[8] = b'=';
        let text = value.as_bytes();
        let len = text.len().min(CARD_SIZE - 10);
        raw[10..10 + len].copy_from_slice(&text[..len]);
        Card { raw }
    }

    /// An integer-valued card, right-justified in the fixed-format columns.
    pub fn integer(keyword: &str, value: i64) -> Self {
        Self::with_value(keyword, &format!("{value:>20}"))
    }

    /// A real-valued card. Integral values are written without a fraction so
    /// that offsets such as `2**63` keep every digit.
    pub fn real(keyword: &str, value: f64) -> Self {
        let text = if value.fract() == 0.0 && value.abs() < 1e19 {
            format!("{}", value as i128)
        } else {
            format!("{value:E}")
        };
        Self::with_value(keyword, &format!("{text:>20}"))
    }

    /// A logical card (`T` or `F`).
    pub fn logical(keyword: &str, value: bool) -> Self {
        let text = if value { "T" } else { "F" };
        Self::with_value(keyword, &format!("{text:>20}"))
    }

    /// A quoted string card.
    pub fn string(keyword: &str, value: &str) -> Self {
        let escaped = value.replace('\'', "''");
        Self::with_value(keyword, &format!("'{escaped:<8}'"))
    }

    /// The END card.
    pub fn end() -> Self {
        let mut raw = [HEADER_PAD_BYTE; CARD_SIZE];
        raw[..3].copy_from_slice(b"END");
        Card { raw }
    }

    pub fn as_bytes(&self) -> &[u8; CARD_SIZE] {
        &self.raw
    }

    /// The keyword with trailing spaces removed.
    pub fn keyword(&self) -> &str {
        str::from_utf8(&self.raw[..8]).unwrap_or("").trim_end()
    }

    pub fn is_end(&self) -> bool {
        &self.raw[..8] == b"END     "
    }

    /// The value field text with any comment stripped, for cards that carry
    /// a value indicator.
    pub fn value_text(&self) -> Option<&str> {
        if &self.raw[8..10] != b"= " {
            return None;
        }
        let field = str::from_utf8(&self.raw[10..]).ok()?;
        let trimmed = field.trim_start();
        if trimmed.starts_with('\'') {
            let mut end = None;
            let bytes = trimmed.as_bytes();
            let mut i = 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    end = Some(i);
                    break;
                }
                i += 1;
            }
            return end.map(|e| &trimmed[..=e]);
        }
        let text = match trimmed.find('/') {
            Some(slash) => &trimmed[..slash],
            None => trimmed,
        };
        Some(text.trim_end())
    }

    pub fn as_integer(&self) -> Option<i64> {
        self.value_text()?.parse().ok()
    }

    /// Real value, accepting integer text and Fortran `D` exponents.
    pub fn as_real(&self) -> Option<f64> {
        let text = self.value_text()?;
        text.replace(['D', 'd'], "E").parse().ok()
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self.value_text()? {
            "T" => Some(true),
            "F" => Some(false),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        let text = self.value_text()?;
        let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
        Some(inner.replace("''", "'").trim_end().to_string())
    }
}

/// Parse the header that starts at `start`, up to and including its END card.
///
/// Returns the cards before END and the padded header length in bytes.
pub fn parse_header(data: &[u8], start: usize) -> HostResult<(Vec<Card>, usize)> {
    let mut cards = Vec::new();
    let mut offset = start;
    loop {
        let end = offset + CARD_SIZE;
        if end > data.len() {
            return Err(Status::NO_END);
        }
        let mut raw = [0u8; CARD_SIZE];
        raw.copy_from_slice(&data[offset..end]);
        if !raw.iter().all(|b| (0x20..=0x7e).contains(b)) {
            return Err(Status::UNKNOWN_REC);
        }
        let card = Card::from_raw(raw);
        offset = end;
        if card.is_end() {
            break;
        }
        cards.push(card);
    }
    Ok((cards, padded_byte_len(offset - start)))
}

/// Serialize cards followed by END, padded to whole blocks with spaces.
pub fn serialize_header(cards: &[Card]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_byte_len((cards.len() + 1) * CARD_SIZE));
    for card in cards {
        out.extend_from_slice(card.as_bytes());
    }
    out.extend_from_slice(Card::end().as_bytes());
    out.resize(padded_byte_len(out.len()), HEADER_PAD_BYTE);
    out
}
