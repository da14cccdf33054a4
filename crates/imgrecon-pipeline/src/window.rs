//! Byte-window view into a disk image
//!
//! Filesystem bindings open a partition by wrapping the image file in an
//! [`ImageWindow`] positioned at the partition's byte offset, so the
//! binding sees the partition as an independent stream without any data
//! being copied.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A stream exposing `[start, start + length)` of an underlying stream
pub struct ImageWindow<R: Read + Seek> {
    inner: R,
    start: u64,
    length: u64,
    position: u64,
    /// Last known absolute position of `inner`, to skip redundant seeks
    inner_position: Option<u64>,
}

impl ImageWindow<File> {
    /// Open a window over an image file from `offset` to end of file
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if `offset` lies beyond the end of the
    /// file, or with the underlying I/O error if the file cannot be
    /// opened.
    pub fn open_path(image: &Path, offset: u64) -> io::Result<Self> {
        let file = File::open(image)?;
        let file_len = file.metadata()?.len();
        if offset > file_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {} beyond image end {}", offset, file_len),
            ));
        }
        Self::new(file, offset, file_len - offset)
    }
}

impl<R: Read + Seek> ImageWindow<R> {
    /// Create a window of `length` bytes starting `start` bytes into
    /// `inner`
    pub fn new(mut inner: R, start: u64, length: u64) -> io::Result<Self> {
        // Fail early if the start offset is not reachable
        let pos = inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            start,
            length,
            position: 0,
            inner_position: Some(pos),
        })
    }

    /// Byte offset of the window within the underlying stream
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Length of the window in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Current position within the window
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes remaining from the current position to the window end
    pub fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }

    /// Consume the window, returning the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for ImageWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let to_read = (buf.len() as u64).min(remaining) as usize;

        let absolute = self.start + self.position;
        if self.inner_position != Some(absolute) {
            self.inner.seek(SeekFrom::Start(absolute))?;
        }

        let bytes_read = self.inner.read(&mut buf[..to_read])?;
        self.position += bytes_read as u64;
        self.inner_position = Some(absolute + bytes_read as u64);
        Ok(bytes_read)
    }
}

impl<R: Read + Seek> Seek for ImageWindow<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.length as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of image window",
            ));
        }
        let target = target as u64;
        if target > self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond end of image window",
            ));
        }

        self.position = target;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Cursor<Vec<u8>> {
        Cursor::new((0..200u8).collect())
    }

    #[test]
    fn test_window_bounds() {
        let window = ImageWindow::new(sample(), 50, 25).unwrap();
        assert_eq!(window.start(), 50);
        assert_eq!(window.length(), 25);
        assert_eq!(window.position(), 0);
        assert_eq!(window.remaining(), 25);
    }

    #[test]
    fn test_sequential_reads_stay_inside_window() {
        let mut window = ImageWindow::new(sample(), 50, 25).unwrap();
        let mut buf = [0u8; 10];

        assert_eq!(window.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, &[50, 51, 52, 53, 54, 55, 56, 57, 58, 59]);

        assert_eq!(window.read(&mut buf).unwrap(), 10);
        assert_eq!(buf[0], 60);

        // Only 5 bytes left in the window
        assert_eq!(window.read(&mut buf).unwrap(), 5);
        assert_eq!(window.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_oversized_read_is_clamped() {
        let mut window = ImageWindow::new(sample(), 10, 4).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(window.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[10, 11, 12, 13]);
    }

    #[test]
    fn test_seek_within_window() {
        let mut window = ImageWindow::new(sample(), 100, 50).unwrap();

        window.seek(SeekFrom::Start(10)).unwrap();
        let mut buf = [0u8; 2];
        window.read(&mut buf).unwrap();
        assert_eq!(&buf, &[110, 111]);

        window.seek(SeekFrom::Current(-2)).unwrap();
        assert_eq!(window.position(), 10);

        window.seek(SeekFrom::End(-1)).unwrap();
        window.read(&mut buf).unwrap();
        assert_eq!(buf[0], 149);
    }

    #[test]
    fn test_seek_outside_window_fails() {
        let mut window = ImageWindow::new(sample(), 100, 50).unwrap();
        assert!(window.seek(SeekFrom::Start(51)).is_err());
        assert!(window.seek(SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn test_open_path_tail_window() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.img");
        std::fs::write(&image, vec![0xAAu8; 1024]).unwrap();

        let window = ImageWindow::open_path(&image, 512).unwrap();
        assert_eq!(window.length(), 512);

        assert!(ImageWindow::open_path(&image, 2048).is_err());
    }
}
