// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Paged buffers used while encoding.
//!
//! A [`Paged`] buffer grows in fixed size pages, so that appending never
//! moves bytes already written. Length and CRC fields are written as
//! placeholders and later back-patched in place with [`Paged::patch`].
//! Once complete the buffer is frozen into [`Pages`], a reference counted,
//! seekable reader over the same pages.

use std::{
    cmp,
    io::{self, Read, Seek, SeekFrom, Write},
    ops::Range,
};

use bytes::{Buf, Bytes, BytesMut};

use crate::{Error, Result};

/// The size of each page.
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, Default)]
pub struct Paged {
    pages: Vec<BytesMut>,
    len: usize,
}

impl Paged {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn put_slice(&mut self, mut src: &[u8]) {
        while !src.is_empty() {
            let page = match self.pages.last_mut() {
                Some(page) if page.len() < PAGE_SIZE => page,
                _ => {
                    self.pages.push(BytesMut::with_capacity(PAGE_SIZE));
                    let last = self.pages.len() - 1;
                    &mut self.pages[last]
                }
            };

            let n = cmp::min(PAGE_SIZE - page.len(), src.len());
            page.extend_from_slice(&src[..n]);
            self.len += n;
            src = &src[n..];
        }
    }

    pub fn put_i8(&mut self, v: i8) {
        self.put_slice(&v.to_be_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_slice(&v.to_be_bytes());
    }

    /// Overwrite previously written bytes starting at `position`.
    pub fn patch(&mut self, position: usize, mut src: &[u8]) -> Result<()> {
        if position + src.len() > self.len {
            return Err(Error::PatchOutOfBounds {
                position,
                length: src.len(),
                len: self.len,
            });
        }

        let mut page = position / PAGE_SIZE;
        let mut offset = position % PAGE_SIZE;

        while !src.is_empty() {
            let n = cmp::min(PAGE_SIZE - offset, src.len());
            self.pages[page][offset..offset + n].copy_from_slice(&src[..n]);
            src = &src[n..];
            page += 1;
            offset = 0;
        }

        Ok(())
    }

    /// The written bytes within `range`, page by page.
    pub fn chunks(&self, range: Range<usize>) -> impl Iterator<Item = &[u8]> {
        let end = cmp::min(range.end, self.len);
        let start = cmp::min(range.start, end);

        self.pages
            .iter()
            .enumerate()
            .filter_map(move |(index, page)| {
                let page_start = index * PAGE_SIZE;
                let page_end = page_start + page.len();

                if page_end <= start || page_start >= end {
                    None
                } else {
                    let from = cmp::max(start, page_start) - page_start;
                    let to = cmp::min(end, page_end) - page_start;
                    Some(&page[from..to])
                }
            })
    }

    #[must_use]
    pub fn freeze(self) -> Pages {
        Pages {
            len: self.len,
            pages: self.pages.into_iter().map(BytesMut::freeze).collect(),
            position: 0,
        }
    }
}

impl Write for Paged {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Frozen pages, readable as a seekable stream.
#[derive(Clone, Debug, Default)]
pub struct Pages {
    pages: Vec<Bytes>,
    len: usize,
    position: usize,
}

impl Pages {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contiguous bytes: zero copy for a single page.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        if self.pages.len() == 1 {
            self.pages.into_iter().next().unwrap_or_default()
        } else {
            let mut contiguous = BytesMut::with_capacity(self.len);
            for page in self.pages {
                contiguous.extend_from_slice(&page[..]);
            }
            contiguous.freeze()
        }
    }
}

impl Buf for Pages {
    fn remaining(&self) -> usize {
        self.len - self.position
    }

    fn chunk(&self) -> &[u8] {
        if self.position >= self.len {
            &[]
        } else {
            let page = self.position / PAGE_SIZE;
            let offset = self.position % PAGE_SIZE;
            &self.pages[page][offset..]
        }
    }

    fn advance(&mut self, cnt: usize) {
        self.position = cmp::min(self.position + cnt, self.len);
    }
}

impl Read for Pages {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.chunk();
        let n = cmp::min(chunk.len(), buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.advance(n);
        Ok(n)
    }
}

impl Seek for Pages {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(offset) => self.len as i128 + i128::from(offset),
            SeekFrom::Current(offset) => self.position as i128 + i128::from(offset),
        };

        if target < 0 {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of pages",
            ))
        } else {
            self.position = cmp::min(usize::try_from(target).unwrap_or(usize::MAX), self.len);
            Ok(self.position as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn spans_pages() -> Result<()> {
        let mut paged = Paged::new();
        let data = (0..PAGE_SIZE * 2 + 17)
            .map(|i| u8::try_from(i % 251).unwrap_or_default())
            .collect::<Vec<_>>();

        paged.put_slice(&data);
        assert_eq!(data.len(), paged.len());

        let pages = paged.freeze();
        assert_eq!(data, pages.into_bytes().to_vec());
        Ok(())
    }

    #[test]
    fn patch_across_page_boundary() -> Result<()> {
        let mut paged = Paged::new();
        paged.put_slice(&vec![0u8; PAGE_SIZE + 4]);

        let position = PAGE_SIZE - 2;
        paged.patch(position, &[1, 2, 3, 4])?;

        let chunks = paged
            .chunks(position..position + 4)
            .flat_map(|chunk| chunk.to_vec())
            .collect::<Vec<_>>();
        assert_eq!(vec![1, 2, 3, 4], chunks);

        assert!(paged.patch(PAGE_SIZE + 2, &[0, 0, 0]).is_err());
        Ok(())
    }

    #[test]
    fn seek_and_read() -> Result<()> {
        let mut paged = Paged::new();
        paged.put_i32(-1);
        paged.put_i64(6);

        let mut pages = paged.freeze();
        _ = pages.seek(SeekFrom::Start(4))?;
        assert_eq!(6, pages.get_i64());
        assert_eq!(0, pages.remaining());

        _ = pages.seek(SeekFrom::End(-12))?;
        let mut buf = [0u8; 4];
        pages.read_exact(&mut buf)?;
        assert_eq!(-1, i32::from_be_bytes(buf));
        Ok(())
    }
}
