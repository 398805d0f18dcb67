use std::io::{self, Write};

/// Forwards every write to an ordered list of sinks.
///
/// Each sink receives the whole buffer via `write_all` before the next one is
/// touched. The first error is returned immediately and later sinks never see
/// that buffer, so no sink can get ahead of the ones before it.
pub struct FanOut<'a, 'w> {
    sinks: &'a mut [&'w mut dyn Write],
}

impl<'a, 'w> FanOut<'a, 'w> {
    pub fn new(sinks: &'a mut [&'w mut dyn Write]) -> Self {
        Self { sinks }
    }
}

impl Write for FanOut<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in self.sinks.iter_mut() {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then fails every write.
    struct Failing {
        budget: usize,
        got: Vec<u8>,
    }

    impl Write for Failing {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.got.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::Other, "sink full"));
            }
            self.got.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_sink_sees_every_byte_in_order() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        {
            let mut sinks: [&mut dyn Write; 2] = [&mut a, &mut b];
            let mut fan = FanOut::new(&mut sinks);
            fan.write_all(b"abc").unwrap();
            fan.write_all(b"def").unwrap();
        }
        assert_eq!(a, b"abcdef");
        assert_eq!(b, b"abcdef");
    }

    #[test]
    fn first_failure_stops_later_sinks() {
        let mut first = Failing {
            budget: 4,
            got: Vec::new(),
        };
        let mut second = Vec::new();
        {
            let mut sinks: [&mut dyn Write; 2] = [&mut first, &mut second];
            let mut fan = FanOut::new(&mut sinks);
            fan.write_all(b"abc").unwrap();
            assert!(fan.write_all(b"de").is_err());
        }
        assert_eq!(first.got, b"abc");
        assert_eq!(second, b"abc");
    }
}
