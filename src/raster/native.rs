//! Native GeoTIFF backend (without GDAL)
//!
//! Built on the `tiff` crate. Opening a file reads its tags only; pixels are
//! decoded per window from the strips or tiles the window touches. Bands are
//! the samples of each full resolution page, chunky or planar, so both
//! interleaved multi-band files and one-page-per-band files open. Overview
//! and mask pages are skipped.
//!
//! Writes are staged band-sequentially in an anonymous scratch file next to
//! the destination and encoded on [`flush`](RasterDatasetMut::flush) as one
//! pixel-interleaved image directory with `SamplesPerPixel` set to the band
//! count, the no-data value in the `GDAL_NODATA` tag and the geo-transform in
//! the GeoTIFF pixel scale and tie point tags. Files that would pass 4 GiB
//! are written as BigTIFF.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use ndarray::{Array2, Array3, ArrayView2};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

use crate::errors::{Result, RsgisError};
use crate::raster::dataset::{check_block_shape, StatisticsAccumulator};
use crate::raster::{
    BandStatistics, DataType, GeoTransform, RasterDataset, RasterDatasetMut, RasterWindow,
};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

/// Reduced resolution and transparency mask bits of `NewSubfileType`.
const SUBFILE_SKIPPED: u32 = 0b101;

/// Pixels per strip or staging pass.
const PASS_PIXELS: usize = 1 << 20;

/// Classic TIFF offsets are 32 bit; keep clear of the limit.
const CLASSIC_LIMIT: u64 = u32::MAX as u64 - (1 << 24);

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn tiff_err(path: &Path, e: impl std::fmt::Display) -> RsgisError {
    RsgisError::Tiff {
        path: path.to_path_buf(),
        msg: e.to_string(),
    }
}

/// `(SampleFormat, BitsPerSample)` of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleKind {
    format: u16,
    bits: u16,
}

impl SampleKind {
    fn of(data_type: DataType) -> Self {
        let format = match data_type {
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => 1,
            DataType::Int16 | DataType::Int32 => 2,
            DataType::Float32 | DataType::Float64 => 3,
        };
        SampleKind {
            format,
            bits: u16::from(data_type.bits()),
        }
    }

    /// Signed bytes widen to `Int16`.
    fn data_type(&self) -> Option<DataType> {
        let data_type = match (self.format, self.bits) {
            (1, 8) => DataType::UInt8,
            (1, 16) => DataType::UInt16,
            (1, 32) => DataType::UInt32,
            (2, 8) | (2, 16) => DataType::Int16,
            (2, 32) => DataType::Int32,
            (3, 32) => DataType::Float32,
            (3, 64) => DataType::Float64,
            _ => return None,
        };
        Some(data_type)
    }

    fn bytes(&self) -> usize {
        usize::from(self.bits / 8)
    }

    /// Decode one sample of `self.bytes()` bytes.
    fn decode(&self, bytes: &[u8], big_endian: bool) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                if big_endian {
                    <$t>::from_be_bytes(raw) as f64
                } else {
                    <$t>::from_le_bytes(raw) as f64
                }
            }};
        }
        match (self.format, self.bits) {
            (1, 8) => f64::from(bytes[0]),
            (2, 8) => f64::from(bytes[0] as i8),
            (1, 16) => read!(u16, 2),
            (2, 16) => read!(i16, 2),
            (1, 32) => read!(u32, 4),
            (2, 32) => read!(i32, 4),
            (3, 32) => read!(f32, 4),
            _ => read!(f64, 8),
        }
    }
}

/// Append `value` as a native endian sample of `data_type`.
fn encode_sample(value: f64, data_type: DataType, out: &mut Vec<u8>) {
    match data_type {
        DataType::UInt8 => out.push(value as u8),
        DataType::UInt16 => out.extend_from_slice(&(value as u16).to_ne_bytes()),
        DataType::UInt32 => out.extend_from_slice(&(value as u32).to_ne_bytes()),
        DataType::Int16 => out.extend_from_slice(&(value as i16).to_ne_bytes()),
        DataType::Int32 => out.extend_from_slice(&(value as i32).to_ne_bytes()),
        DataType::Float32 => out.extend_from_slice(&(value as f32).to_ne_bytes()),
        DataType::Float64 => out.extend_from_slice(&value.to_ne_bytes()),
    }
}

/// Uncompressed chunks of a page the `tiff` crate has no colour type for,
/// such as two or five band `BlackIsZero` images. Read straight from disk.
#[derive(Debug, Clone)]
struct RawChunks {
    offsets: Vec<u64>,
    big_endian: bool,
}

/// One full resolution image directory of a source file.
#[derive(Debug, Clone)]
struct Page {
    ifd: usize,
    samples: usize,
    planar: bool,
    /// Nominal `(width, height)` of a strip or tile.
    chunk: (usize, usize),
    kind: SampleKind,
    raw: Option<RawChunks>,
}

impl Page {
    /// Samples interleaved in each chunk.
    fn chunk_samples(&self) -> usize {
        if self.planar {
            1
        } else {
            self.samples
        }
    }
}

enum ChunkReader<'a> {
    Decoded(Decoder<BufReader<File>>),
    Raw(File, &'a RawChunks),
}

/// Decoded chunk, `stride` pixels per row.
struct Chunk {
    values: Vec<f64>,
    stride: usize,
}

#[derive(Debug)]
enum Storage {
    /// Pixels stay in the file, `(page, sample)` per band.
    Source {
        pages: Vec<Page>,
        bands: Vec<(usize, usize)>,
    },
    /// Band-sequential native endian `f64` scratch file.
    Staged(File),
}

/// A TIFF raster read and written window by window.
#[derive(Debug)]
pub struct TiffRaster {
    path: PathBuf,
    size: (usize, usize),
    data_type: DataType,
    no_data: Vec<Option<f64>>,
    descriptions: Vec<String>,
    geo_transform: Option<GeoTransform>,
    projection: Option<String>,
    statistics: Vec<Option<BandStatistics>>,
    storage: Storage,
    dirty: bool,
}

impl TiffRaster {
    /// Create a zero filled raster, written to `path` on flush.
    ///
    /// The destination is created straight away, so an unwritable path
    /// fails here rather than on flush.
    pub fn create(
        path: impl Into<PathBuf>,
        size: (usize, usize),
        band_count: usize,
        data_type: DataType,
    ) -> Result<Self> {
        let path = path.into();
        File::create(&path).map_err(|e| RsgisError::io(&path, e))?;
        let staging = stage_file(&path, size, band_count)?;
        Ok(TiffRaster {
            path,
            size,
            data_type,
            no_data: vec![None; band_count],
            descriptions: vec![String::new(); band_count],
            geo_transform: None,
            projection: None,
            statistics: vec![None; band_count],
            storage: Storage::Staged(staging),
            dirty: true,
        })
    }

    /// Open an existing TIFF, reading its tags only.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let big_endian = read_byte_order(&path)?;
        let mut decoder = open_decoder(&path)?;

        let mut pages: Vec<Page> = Vec::new();
        let mut bands = Vec::new();
        let mut no_data = Vec::new();
        let mut size = None;
        let mut data_type = None;
        let mut geo_transform = None;
        let mut projection = None;

        let mut ifd = 0;
        loop {
            let subfile = decoder
                .find_tag_unsigned::<u32>(Tag::NewSubfileType)
                .map_err(|e| tiff_err(&path, e))?
                .unwrap_or(0);
            if subfile & SUBFILE_SKIPPED == 0 {
                let page = read_page(&mut decoder, ifd, big_endian, &path)?;
                let (width, height) = decoder.dimensions().map_err(|e| tiff_err(&path, e))?;
                let page_size = (width as usize, height as usize);
                if *size.get_or_insert(page_size) != page_size {
                    return Err(tiff_err(&path, "pages have different dimensions"));
                }
                let page_type = page
                    .kind
                    .data_type()
                    .ok_or_else(|| tiff_err(&path, "unsupported TIFF sample format"))?;
                if *data_type.get_or_insert(page_type) != page_type {
                    return Err(tiff_err(&path, "pages have different data types"));
                }
                if pages.is_empty() {
                    geo_transform = read_geo_transform(&mut decoder);
                    projection = decoder.get_tag_ascii_string(tag(GEO_ASCII_PARAMS)).ok();
                }
                let page_no_data = decoder
                    .get_tag_ascii_string(tag(GDAL_NODATA))
                    .ok()
                    .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());
                for sample in 0..page.samples {
                    bands.push((pages.len(), sample));
                    no_data.push(page_no_data);
                }
                pages.push(page);
            }

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(|e| tiff_err(&path, e))?;
            ifd += 1;
        }

        let size = size.ok_or_else(|| tiff_err(&path, "no full resolution image"))?;
        let data_type = data_type.unwrap_or(DataType::Float32);
        let band_count = bands.len();
        debug!(
            "Opened TIFF '{}': {}x{}, {} band(s) of {} in {} page(s)",
            path.display(),
            size.0,
            size.1,
            band_count,
            data_type,
            pages.len()
        );

        Ok(TiffRaster {
            path,
            size,
            data_type,
            no_data,
            descriptions: vec![String::new(); band_count],
            geo_transform,
            projection: projection.map(|wkt| wkt.trim_end_matches(['|', '\0']).to_string()),
            statistics: vec![None; band_count],
            storage: Storage::Source { pages, bands },
            dirty: false,
        })
    }

    /// Read a window of a band still in the source file.
    fn read_source(
        &self,
        pages: &[Page],
        (page_index, sample): (usize, usize),
        window: &RasterWindow,
    ) -> Result<Array2<f64>> {
        let page = &pages[page_index];
        let (width, height) = self.size;
        let (chunk_width, chunk_height) = page.chunk;
        let across = width.div_ceil(chunk_width);
        let per_plane = across * height.div_ceil(chunk_height);
        let spp = page.chunk_samples();
        let offset = if page.planar { 0 } else { sample };

        let mut out = Array2::zeros(window.shape());
        if window.width == 0 || window.height == 0 {
            return Ok(out);
        }
        let mut reader = match &page.raw {
            Some(raw) => ChunkReader::Raw(
                File::open(&self.path).map_err(|e| RsgisError::io(&self.path, e))?,
                raw,
            ),
            None => {
                let mut decoder = open_decoder(&self.path)?;
                decoder
                    .seek_to_image(page.ifd)
                    .map_err(|e| tiff_err(&self.path, e))?;
                ChunkReader::Decoded(decoder)
            }
        };

        for cy in window.y_offset / chunk_height..=(window.y_end() - 1) / chunk_height {
            for cx in window.x_offset / chunk_width..=(window.x_end() - 1) / chunk_width {
                let mut index = cy * across + cx;
                if page.planar {
                    index += sample * per_plane;
                }
                let (x0, y0) = (cx * chunk_width, cy * chunk_height);
                let data_width = chunk_width.min(width - x0);
                let data_height = chunk_height.min(height - y0);
                let chunk = match &mut reader {
                    ChunkReader::Decoded(decoder) => self.decode_chunk(decoder, index)?,
                    ChunkReader::Raw(file, raw) => {
                        self.read_raw_chunk(file, page, *raw, index, data_height)?
                    }
                };

                let rows = window.y_offset.max(y0)..window.y_end().min(y0 + data_height);
                let cols = window.x_offset.max(x0)..window.x_end().min(x0 + data_width);
                for row in rows {
                    for col in cols.clone() {
                        let at = ((row - y0) * chunk.stride + (col - x0)) * spp + offset;
                        out[[row - window.y_offset, col - window.x_offset]] = chunk.values[at];
                    }
                }
            }
        }
        Ok(out)
    }

    fn decode_chunk(&self, decoder: &mut Decoder<BufReader<File>>, index: usize) -> Result<Chunk> {
        let index = u32::try_from(index).map_err(|e| tiff_err(&self.path, e))?;
        let (stride, _) = decoder.chunk_data_dimensions(index);
        let result = decoder
            .read_chunk(index)
            .map_err(|e| tiff_err(&self.path, e))?;
        Ok(Chunk {
            values: decode_values(result, &self.path)?,
            stride: stride as usize,
        })
    }

    fn read_raw_chunk(
        &self,
        file: &mut File,
        page: &Page,
        raw: &RawChunks,
        index: usize,
        rows: usize,
    ) -> Result<Chunk> {
        let stride = page.chunk.0;
        let sample_bytes = page.kind.bytes();
        let offset = *raw
            .offsets
            .get(index)
            .ok_or_else(|| tiff_err(&self.path, format!("missing chunk {index}")))?;
        let mut bytes = vec![0u8; rows * stride * page.chunk_samples() * sample_bytes];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut bytes))
            .map_err(|e| RsgisError::io(&self.path, e))?;
        let values = bytes
            .chunks_exact(sample_bytes)
            .map(|b| page.kind.decode(b, raw.big_endian))
            .collect();
        Ok(Chunk { values, stride })
    }

    /// Copy the source pixels into a scratch file so they can be changed
    /// and the destination rewritten.
    fn stage(&mut self) -> Result<()> {
        if matches!(self.storage, Storage::Staged(_)) {
            return Ok(());
        }
        let staging = stage_file(&self.path, self.size, self.band_count())?;
        for band in 1..=self.band_count() {
            for window in self.passes() {
                let block = self.read_window(band, &window)?;
                write_staged(&staging, &self.path, self.size, band, &window, block.view())?;
            }
        }
        debug!("Staged '{}' for writing", self.path.display());
        self.storage = Storage::Staged(staging);
        Ok(())
    }

    /// Full width row windows of about `PASS_PIXELS` pixels.
    fn passes(&self) -> impl Iterator<Item = RasterWindow> {
        let (width, height) = self.size;
        let rows = (PASS_PIXELS / width.max(1)).max(1);
        (0..height)
            .step_by(rows)
            .map(move |y| RasterWindow::new(0, y, width, rows.min(height - y)))
    }

    fn encode<W: Write + Seek, K: TiffKind>(
        &self,
        mut encoder: TiffEncoder<W, K>,
        big: bool,
    ) -> Result<()> {
        let path = self.path.as_path();
        let (width, height) = self.size;
        let band_count = self.band_count();
        let rows_per_strip = (PASS_PIXELS / (width * band_count).max(1)).max(1);

        let mut dir = encoder.new_directory().map_err(|e| tiff_err(path, e))?;
        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        let mut bytes = Vec::new();
        for y in (0..height).step_by(rows_per_strip) {
            let window = RasterWindow::new(0, y, width, rows_per_strip.min(height - y));
            let blocks = (1..=band_count)
                .map(|band| self.read_window(band, &window))
                .collect::<Result<Vec<_>>>()?;
            bytes.clear();
            for row in 0..window.height {
                for col in 0..width {
                    for block in &blocks {
                        encode_sample(block[[row, col]], self.data_type, &mut bytes);
                    }
                }
            }
            offsets.push(dir.write_data(&bytes[..]).map_err(|e| tiff_err(path, e))?);
            byte_counts.push(bytes.len() as u64);
        }

        self.write_tags(&mut dir, rows_per_strip.min(height.max(1)))
            .and_then(|_| write_strip_offsets(&mut dir, &offsets, &byte_counts, big))
            .and_then(|_| dir.finish())
            .map_err(|e| tiff_err(path, e))
    }

    /// Layout and georeferencing tags of a chunky, uncompressed, striped image.
    fn write_tags<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<'_, W, K>,
        rows_per_strip: usize,
    ) -> tiff::TiffResult<()> {
        let (width, height) = self.size;
        let band_count = self.band_count();
        let kind = SampleKind::of(self.data_type);
        dir.write_tag(Tag::ImageWidth, width as u32)?;
        dir.write_tag(Tag::ImageLength, height as u32)?;
        dir.write_tag(Tag::BitsPerSample, &vec![kind.bits; band_count][..])?;
        dir.write_tag(Tag::Compression, 1u16)?;
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
        dir.write_tag(Tag::SamplesPerPixel, band_count as u16)?;
        dir.write_tag(Tag::RowsPerStrip, rows_per_strip as u32)?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        dir.write_tag(Tag::SampleFormat, &vec![kind.format; band_count][..])?;
        if band_count > 1 {
            dir.write_tag(Tag::ExtraSamples, &vec![0u16; band_count - 1][..])?;
        }

        // GDAL keeps one no-data value per dataset
        if let Some(nd) = self.no_data.first().copied().flatten() {
            dir.write_tag(tag(GDAL_NODATA), format_no_data(nd).as_str())?;
        }
        if let Some(gt) = self.geo_transform {
            let scale = [gt[1], gt[5].abs(), 0.0];
            let tiepoint = [0.0, 0.0, 0.0, gt[0], gt[3], 0.0];
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
            dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
        }
        if let Some(wkt) = self.projection.as_deref().filter(|p| !p.is_empty()) {
            dir.write_tag(tag(GEO_ASCII_PARAMS), format!("{wkt}|").as_str())?;
        }
        if let Some(metadata) = self.gdal_metadata() {
            dir.write_tag(tag(GDAL_METADATA), metadata.as_str())?;
        }
        Ok(())
    }

    /// `GDAL_METADATA` XML with band descriptions and computed statistics.
    fn gdal_metadata(&self) -> Option<String> {
        let mut items = Vec::new();
        for (sample, description) in self.descriptions.iter().enumerate() {
            if !description.is_empty() {
                items.push(format!(
                    "<Item name=\"DESCRIPTION\" sample=\"{sample}\" role=\"description\">{description}</Item>"
                ));
            }
        }
        for (sample, stats) in self.statistics.iter().enumerate() {
            let Some(stats) = stats else { continue };
            for (name, value) in [
                ("STATISTICS_MINIMUM", stats.min),
                ("STATISTICS_MAXIMUM", stats.max),
                ("STATISTICS_MEAN", stats.mean),
                ("STATISTICS_STDDEV", stats.std_dev),
            ] {
                items.push(format!(
                    "<Item name=\"{name}\" sample=\"{sample}\">{value}</Item>"
                ));
            }
        }
        (!items.is_empty()).then(|| format!("<GDALMetadata>{}</GDALMetadata>", items.concat()))
    }

    /// The scratch file, staging the source first. Marks the raster dirty.
    fn staging(&mut self) -> Result<&File> {
        self.stage()?;
        self.dirty = true;
        match &self.storage {
            Storage::Staged(file) => Ok(file),
            Storage::Source { .. } => Err(tiff_err(&self.path, "raster is not staged")),
        }
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| RsgisError::io(path, e))?;
    Ok(Decoder::new(BufReader::new(file))
        .map_err(|e| tiff_err(path, e))?
        .with_limits(Limits::unlimited()))
}

/// True for a big endian (`MM`) file.
fn read_byte_order(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 2];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|e| RsgisError::io(path, e))?;
    Ok(&magic == b"MM")
}

fn read_page(
    decoder: &mut Decoder<BufReader<File>>,
    ifd: usize,
    big_endian: bool,
    path: &Path,
) -> Result<Page> {
    let err = |e: tiff::TiffError| tiff_err(path, e);
    let samples = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
        .map_err(err)?
        .unwrap_or(1);
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(err)?
        == Some(2);
    let first = |values: Option<Vec<u16>>, default| {
        values.and_then(|v| v.first().copied()).unwrap_or(default)
    };
    let kind = SampleKind {
        format: first(
            decoder
                .find_tag_unsigned_vec(Tag::SampleFormat)
                .map_err(err)?,
            1,
        ),
        bits: first(
            decoder
                .find_tag_unsigned_vec(Tag::BitsPerSample)
                .map_err(err)?,
            1,
        ),
    };
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();

    let raw = if decoder.colortype().is_ok() {
        None
    } else {
        let compression = decoder
            .find_tag_unsigned::<u16>(Tag::Compression)
            .map_err(err)?
            .unwrap_or(1);
        if compression != 1 {
            return Err(tiff_err(
                path,
                format!("unsupported compressed layout of {samples} sample(s) per pixel"),
            ));
        }
        let offsets = match decoder
            .find_tag_unsigned_vec::<u64>(Tag::TileOffsets)
            .map_err(err)?
        {
            Some(offsets) => offsets,
            None => decoder
                .find_tag_unsigned_vec::<u64>(Tag::StripOffsets)
                .map_err(err)?
                .unwrap_or_default(),
        };
        Some(RawChunks {
            offsets,
            big_endian,
        })
    };

    Ok(Page {
        ifd,
        samples: usize::from(samples),
        planar,
        chunk: (chunk_width as usize, chunk_height as usize),
        kind,
        raw,
    })
}

/// BigTIFF takes 64 bit offsets, classic TIFF 32 bit ones.
fn write_strip_offsets<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    offsets: &[u64],
    byte_counts: &[u64],
    big: bool,
) -> tiff::TiffResult<()> {
    if big {
        dir.write_tag(Tag::StripOffsets, offsets)?;
        dir.write_tag(Tag::StripByteCounts, byte_counts)
    } else {
        let offsets: Vec<u32> = offsets.iter().map(|&o| o as u32).collect();
        let byte_counts: Vec<u32> = byte_counts.iter().map(|&c| c as u32).collect();
        dir.write_tag(Tag::StripOffsets, &offsets[..])?;
        dir.write_tag(Tag::StripByteCounts, &byte_counts[..])
    }
}

/// Zero filled scratch file for `band_count` bands of `size`.
fn stage_file(path: &Path, size: (usize, usize), band_count: usize) -> Result<File> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = tempfile::tempfile_in(dir).map_err(|e| RsgisError::io(dir, e))?;
    let len = (size.0 * size.1 * band_count * 8) as u64;
    file.set_len(len).map_err(|e| RsgisError::io(dir, e))?;
    Ok(file)
}

fn staged_offset(size: (usize, usize), band: usize, row: usize, col: usize) -> u64 {
    ((((band - 1) * size.1 + row) * size.0 + col) * 8) as u64
}

fn read_staged(
    mut file: &File,
    path: &Path,
    size: (usize, usize),
    band: usize,
    window: &RasterWindow,
) -> Result<Array2<f64>> {
    let mut bytes = vec![0u8; window.width * 8];
    let mut out = Array2::zeros(window.shape());
    for (r, mut row) in out.outer_iter_mut().enumerate() {
        let at = staged_offset(size, band, window.y_offset + r, window.x_offset);
        file.seek(SeekFrom::Start(at))
            .and_then(|_| file.read_exact(&mut bytes))
            .map_err(|e| RsgisError::io(path, e))?;
        for (value, raw) in row.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut sample = [0u8; 8];
            sample.copy_from_slice(raw);
            *value = f64::from_ne_bytes(sample);
        }
    }
    Ok(out)
}

fn write_staged(
    mut file: &File,
    path: &Path,
    size: (usize, usize),
    band: usize,
    window: &RasterWindow,
    data: ArrayView2<f64>,
) -> Result<()> {
    let mut bytes = Vec::with_capacity(window.width * 8);
    for (r, row) in data.outer_iter().enumerate() {
        bytes.clear();
        for &value in row {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        let at = staged_offset(size, band, window.y_offset + r, window.x_offset);
        file.seek(SeekFrom::Start(at))
            .and_then(|_| file.write_all(&bytes))
            .map_err(|e| RsgisError::io(path, e))?;
    }
    Ok(())
}

fn format_no_data(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

fn decode_values(result: DecodingResult, path: &Path) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(buf) => cast_in(buf),
        DecodingResult::U16(buf) => cast_in(buf),
        DecodingResult::U32(buf) => cast_in(buf),
        DecodingResult::I8(buf) => cast_in(buf),
        DecodingResult::I16(buf) => cast_in(buf),
        DecodingResult::I32(buf) => cast_in(buf),
        DecodingResult::F32(buf) => cast_in(buf),
        DecodingResult::F64(buf) => buf,
        _ => return Err(tiff_err(path, "unsupported TIFF pixel format")),
    };
    Ok(values)
}

fn cast_in<T: Into<f64>>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(Into::into).collect()
}

fn read_geo_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some([origin_x, scale[0], 0.0, origin_y, 0.0, -scale[1]])
}

impl RasterDataset for TiffRaster {
    fn path(&self) -> &Path {
        &self.path
    }

    fn raster_size(&self) -> (usize, usize) {
        self.size
    }

    fn band_count(&self) -> usize {
        self.no_data.len()
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        self.no_data.get(band.wrapping_sub(1)).copied().flatten()
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    fn projection(&self) -> Option<String> {
        self.projection.clone()
    }

    fn read_window(&self, band: usize, window: &RasterWindow) -> Result<Array2<f64>> {
        self.check_access(band, window)?;
        match &self.storage {
            Storage::Source { pages, bands } => self.read_source(pages, bands[band - 1], window),
            Storage::Staged(file) => read_staged(file, &self.path, self.size, band, window),
        }
    }
}

impl RasterDatasetMut for TiffRaster {
    fn write_window(
        &mut self,
        band: usize,
        window: &RasterWindow,
        data: ArrayView2<f64>,
    ) -> Result<()> {
        self.check_access(band, window)?;
        check_block_shape(&self.path.to_string_lossy(), window, &data)?;
        let data_type = self.data_type;
        let stored = data.mapv(|v| data_type.store(v));
        let (path, size) = (self.path.clone(), self.size);
        let file = self.staging()?;
        write_staged(file, &path, size, band, window, stored.view())?;
        self.statistics[band - 1] = None;
        Ok(())
    }

    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        self.check_access(band, &RasterWindow::default())?;
        self.no_data[band - 1] = no_data;
        self.dirty = true;
        Ok(())
    }

    fn set_band_description(&mut self, band: usize, description: &str) -> Result<()> {
        self.check_access(band, &RasterWindow::default())?;
        self.descriptions[band - 1] = description.to_string();
        self.dirty = true;
        Ok(())
    }

    fn set_geo_transform(&mut self, transform: &GeoTransform) -> Result<()> {
        self.geo_transform = Some(*transform);
        self.dirty = true;
        Ok(())
    }

    fn set_projection(&mut self, projection: &str) -> Result<()> {
        self.projection = Some(projection.to_string());
        self.dirty = true;
        Ok(())
    }

    fn compute_statistics(&mut self, band: usize) -> Result<Option<BandStatistics>> {
        self.check_access(band, &RasterWindow::default())?;
        let mut acc = StatisticsAccumulator::new(self.no_data[band - 1]);
        for window in self.passes() {
            acc.extend(self.read_window(band, &window)?.iter());
        }
        let stats = acc.finish();
        self.statistics[band - 1] = stats;
        self.dirty = true;
        Ok(stats)
    }

    fn build_overviews(&mut self, _levels: &[usize]) -> Result<bool> {
        Ok(false)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        // the destination is truncated below, so its pixels must be copied first
        self.stage()?;
        let path = self.path.clone();
        let file = File::create(&path).map_err(|e| RsgisError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        let (width, height) = self.size;
        let data_bytes = (width * height * self.band_count()) as u64
            * u64::from(self.data_type.bits() / 8);
        if data_bytes > CLASSIC_LIMIT {
            debug!("Writing '{}' as BigTIFF", path.display());
            let encoder = TiffEncoder::new_big(&mut writer).map_err(|e| tiff_err(&path, e))?;
            self.encode(encoder, true)?;
        } else {
            let encoder = TiffEncoder::new(&mut writer).map_err(|e| tiff_err(&path, e))?;
            self.encode(encoder, false)?;
        }
        writer.flush().map_err(|e| RsgisError::io(&path, e))?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for TiffRaster {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!("Failed to write '{}': {}", self.path.display(), e);
            }
        }
    }
}

/// Read every band of the TIFF at `path` into a `(band, row, col)` array.
pub fn read_tiff_bands(path: impl AsRef<Path>) -> Result<Array3<f64>> {
    let raster = TiffRaster::open(path.as_ref())?;
    let (width, height) = raster.raster_size();
    let window = RasterWindow::full((width, height));
    let mut out = Array3::zeros((raster.band_count(), height, width));
    for (index, mut band) in out.outer_iter_mut().enumerate() {
        band.assign(&raster.read_window(index + 1, &window)?);
    }
    Ok(out)
}

/// Write a single band raster to a new TIFF at `path`.
pub fn write_tiff_band(
    path: impl Into<PathBuf>,
    band: ArrayView2<f64>,
    data_type: DataType,
    no_data: Option<f64>,
) -> Result<()> {
    let (rows, cols) = band.dim();
    let mut raster = TiffRaster::create(path, (cols, rows), 1, data_type)?;
    raster.write_window(1, &RasterWindow::full((cols, rows)), band)?;
    raster.set_no_data_value(1, no_data)?;
    raster.flush()
}
