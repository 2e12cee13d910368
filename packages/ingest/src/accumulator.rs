//! Groups decoded records into fixed-size batches.

use company_registry_company_models::CompanyRecord;

/// Buffers records until a batch is full.
///
/// Never holds more than `max` records; the caller writes each returned
/// batch before adding more.
#[derive(Debug)]
pub struct BatchAccumulator {
    max: usize,
    buffer: Vec<CompanyRecord>,
    peak_len: usize,
}

impl BatchAccumulator {
    /// Creates an accumulator that emits batches of `max` records.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[must_use]
    pub fn new(max: usize) -> Self {
        assert!(max > 0, "batch size must be positive");
        Self {
            max,
            buffer: Vec::with_capacity(max),
            peak_len: 0,
        }
    }

    /// Appends `record`, returning the full batch once it reaches the
    /// configured size.
    pub fn add(&mut self, record: CompanyRecord) -> Option<Vec<CompanyRecord>> {
        self.buffer.push(record);
        self.peak_len = self.peak_len.max(self.buffer.len());

        if self.buffer.len() >= self.max {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.max),
            ))
        } else {
            None
        }
    }

    /// Returns the final partial batch, if any records are buffered.
    pub fn flush_remainder(&mut self) -> Option<Vec<CompanyRecord>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Records currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Largest number of records ever buffered at once.
    #[must_use]
    pub const fn peak_len(&self) -> usize {
        self.peak_len
    }
}
