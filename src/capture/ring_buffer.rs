//! Lock-free SPSC sample hand-off.
//!
//! The cpal callback thread produces interleaved native-rate f32 samples;
//! the chunk and meter tasks drain them. Backed by the `ringbuf` crate so
//! the audio callback never takes a lock.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Producer half — lives in the cpal audio callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half — lives in a draining task.
pub struct SampleDrain {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/drain pair holding up to `capacity` samples.
pub fn sample_buffer(capacity: usize) -> (SampleProducer, SampleDrain) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleDrain { inner: cons })
}

impl SampleProducer {
    /// Push samples, returning how many were written. Whatever does not
    /// fit is dropped; the drain side will note the shortfall.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: the ringbuf producer is single-threaded by contract, and cpal
// callbacks run on one dedicated audio thread.
unsafe impl Send for SampleProducer {}

impl SampleDrain {
    /// Number of samples currently buffered.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Take every buffered sample.
    pub fn drain(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

unsafe impl Send for SampleDrain {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain_round_trips_in_order() {
        let (mut prod, mut drain) = sample_buffer(16);
        assert_eq!(prod.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(drain.available(), 3);
        assert_eq!(drain.drain(), vec![1.0, 2.0, 3.0]);
        assert_eq!(drain.available(), 0);
        assert!(drain.drain().is_empty());
    }

    #[test]
    fn overflow_drops_the_tail() {
        let (mut prod, mut drain) = sample_buffer(4);
        assert_eq!(prod.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 4);
        assert_eq!(drain.drain(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
