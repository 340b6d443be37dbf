//! Short identifier generation: `a`, `b`, ..., `z`, `aa`, `ab`, ...

/// Produces bijective base-26 lowercase names in order.
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    index: u64,
}

impl NameGenerator {
    pub const fn new() -> Self {
        Self { index: 0 }
    }

    /// The next name in sequence.
    pub fn next_name(&mut self) -> String {
        let name = encode(self.index);
        self.index += 1;
        name
    }

    /// The next name for which `taken` is false.
    pub fn next_avoiding(&mut self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let name = self.next_name();
            if !taken(&name) {
                return name;
            }
        }
    }
}

fn encode(index: u64) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
