use std::hint::black_box;

/// Sink for values produced by benchmark methods, so the optimizer cannot
/// drop the computation that produced them.
#[derive(Debug, Default)]
pub struct Blackhole {
    consumed: u64,
    evaporated: bool,
}

impl Blackhole {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn consume<T>(&mut self, value: T) {
        black_box(value);
        self.consumed = self.consumed.wrapping_add(1);
    }

    /// Values consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Retire the sink at the end of an iteration.
    pub fn evaporate(&mut self) {
        black_box(self.consumed);
        self.evaporated = true;
    }

    pub fn is_evaporated(&self) -> bool {
        self.evaporated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_count_consumed_values() {
        let mut bh = Blackhole::new();
        bh.consume(1u8);
        bh.consume(String::from("x"));
        assert_eq!(bh.consumed(), 2);
        bh.evaporate();
        assert!(bh.is_evaporated());
    }
}
