/// Cuts a mono signal into overlapping analysis blocks.
///
/// Block `k` starts at sample `k * hop` and is `size` samples long; samples
/// past the end of the signal read as zero. The sequence ends with the
/// first block that starts at or beyond the end of the signal, so the
/// tracker always sees one fully silent frame last.
pub struct BlockReader<'a> {
    samples: &'a [f32],
    size: usize,
    hop: usize,
    next: usize,
    buffer: Vec<f64>,
}

impl<'a> BlockReader<'a> {
    pub fn new(samples: &'a [f32], size: usize, hop: usize) -> Self {
        Self {
            samples,
            size,
            hop: hop.max(1),
            next: 0,
            buffer: vec![0.0; size],
        }
    }

    /// Number of blocks the reader yields in total.
    pub fn block_count(&self) -> usize {
        (self.samples.len() + self.hop - 1) / self.hop + 1
    }

    /// Fill the buffer with block `index`, or `None` past the last block.
    pub fn block(&mut self, index: usize) -> Option<&[f64]> {
        if index >= self.block_count() {
            return None;
        }

        let start = (index * self.hop).min(self.samples.len());
        let end = (start + self.size).min(self.samples.len());
        let available = &self.samples[start..end];

        for (dst, &src) in self.buffer.iter_mut().zip(available) {
            *dst = src as f64;
        }
        for dst in self.buffer[available.len()..].iter_mut() {
            *dst = 0.0;
        }

        Some(&self.buffer)
    }

    /// Next block in sequence with its index.
    pub fn next_block(&mut self) -> Option<(usize, &[f64])> {
        let index = self.next;
        self.next += 1;
        self.block(index).map(|block| (index, block))
    }
}
