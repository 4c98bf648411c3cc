//! Paper tape reader (port 0x05 in) and punch (port 0x05 out).

/// Byte returned once the reader runs off the end.
pub const END_OF_TAPE: u8 = 0x1A;

pub struct PaperTape {
    name: String,
    data: Vec<u8>,
    position: usize,
}

impl PaperTape {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "EOT".to_string(),
            data: Vec::new(),
            position: 0,
        }
    }

    pub fn mount(&mut self, name: &str, data: Vec<u8>) {
        self.name = name.to_string();
        self.data = data;
        self.position = 0;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Next byte, or [`END_OF_TAPE`] forever once exhausted.
    pub fn read(&mut self) -> u8 {
        match self.data.get(self.position) {
            Some(&byte) => {
                self.position += 1;
                byte
            }
            None => END_OF_TAPE,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Default for PaperTape {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TapePunch {
    name: String,
    data: Vec<u8>,
}

impl TapePunch {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Vec::new(),
        }
    }

    pub fn punch(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Tear off everything punched so far.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for TapePunch {
    fn default() -> Self {
        Self::new("puncher.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_hits_end_and_rewinds() {
        let mut tape = PaperTape::new();
        assert_eq!(tape.read(), END_OF_TAPE);

        tape.mount("hello.hex", b"hi".to_vec());
        assert_eq!(tape.name(), "hello.hex");
        assert_eq!(tape.read(), b'h');
        assert_eq!(tape.read(), b'i');
        assert_eq!(tape.read(), END_OF_TAPE);
        assert_eq!(tape.read(), END_OF_TAPE);
        assert_eq!(tape.position(), 2);

        tape.rewind();
        assert_eq!(tape.read(), b'h');
    }

    #[test]
    fn punch_accumulates() {
        let mut punch = TapePunch::default();
        punch.punch(1);
        punch.punch(2);
        assert_eq!(punch.len(), 2);
        assert_eq!(punch.take(), vec![1, 2]);
        assert!(punch.is_empty());
        assert_eq!(punch.name(), "puncher.txt");
    }
}
