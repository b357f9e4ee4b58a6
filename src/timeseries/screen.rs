use std::ops::AddAssign;

use log::debug;
use ndarray::{Array1, Array2};

use super::harmonic::design_matrix;
use super::robust::TukeyBiweight;
use super::series::PixelTimeSeries;
use crate::errors::{Result, RsgisError};

/// Residual class of one observation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutlierFlag {
    #[default]
    Clear = 0,
    Low = 1,
    High = 2,
}

impl OutlierFlag {
    pub fn value(self) -> u8 {
        self as u8
    }

    fn classify(residual: f64, limit: f64) -> Self {
        if residual > limit {
            OutlierFlag::High
        } else if residual < -limit {
            OutlierFlag::Low
        } else {
            OutlierFlag::Clear
        }
    }
}

/// Cloud and shadow class of one date.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TmaskClass {
    #[default]
    Clear = 0,
    Cloud = 1,
    Shadow = 2,
}

impl TmaskClass {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Tallies of how each pixel band was handled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScreenStats {
    /// Bands that were fitted and classified.
    pub fits: usize,
    /// Bands with too few valid observations to fit.
    pub insufficient: usize,
    /// Bands whose fit was numerically singular.
    pub singular: usize,
}

impl ScreenStats {
    pub fn total(&self) -> usize {
        self.fits + self.insufficient + self.singular
    }
}

impl AddAssign for ScreenStats {
    fn add_assign(&mut self, other: Self) {
        self.fits += other.fits;
        self.insufficient += other.insufficient;
        self.singular += other.singular;
    }
}

/// Residuals of the valid observations of one band.
struct BandFit {
    positions: Vec<usize>,
    residuals: Array1<f64>,
    rmse: f64,
    /// Largest absolute valid value, used to ignore rounding noise.
    value_scale: f64,
}

impl BandFit {
    /// Flags for every date of the series; missing dates stay clear.
    fn flags(&self, len: usize, limit: f64) -> Vec<OutlierFlag> {
        let limit = limit.max(self.value_scale * 1e-9);
        let mut flags = vec![OutlierFlag::Clear; len];
        for (&position, &residual) in self.positions.iter().zip(self.residuals.iter()) {
            flags[position] = OutlierFlag::classify(residual, limit);
        }
        flags
    }
}

/// Seasonal model outlier screen.
///
/// Every band is fitted independently against a harmonic model of the valid
/// dates; observations whose residual exceeds `threshold` times the fit RMSE
/// are flagged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierScreen {
    pub threshold: f64,
    /// Fewer valid observations than this leave a band all clear.
    pub min_observations: usize,
    pub estimator: TukeyBiweight,
}

impl Default for OutlierScreen {
    fn default() -> Self {
        OutlierScreen {
            threshold: 3.0,
            min_observations: 12,
            estimator: TukeyBiweight::default(),
        }
    }
}

impl OutlierScreen {
    pub fn new(threshold: f64) -> Self {
        OutlierScreen {
            threshold,
            ..Default::default()
        }
    }

    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations;
        self
    }

    fn fit_band(
        &self,
        series: &PixelTimeSeries,
        band: usize,
        stats: &mut ScreenStats,
    ) -> Option<BandFit> {
        let (positions, dates, values) = series.valid_observations(band);
        if positions.len() < self.min_observations {
            stats.insufficient += 1;
            return None;
        }
        let x = design_matrix(&dates);
        let value_scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let y = Array1::from(values);
        match self.estimator.fit(x.view(), y.view()) {
            Some(fit) => {
                stats.fits += 1;
                Some(BandFit {
                    positions,
                    residuals: fit.residuals,
                    rmse: fit.rmse,
                    value_scale,
                })
            }
            None => {
                debug!(
                    "Singular fit for band {} over {} observations, leaving it clear",
                    band,
                    positions.len()
                );
                stats.singular += 1;
                None
            }
        }
    }

    /// Flag every date of `band` (a column of `series`).
    pub fn screen_band(
        &self,
        series: &PixelTimeSeries,
        band: usize,
        stats: &mut ScreenStats,
    ) -> Vec<OutlierFlag> {
        match self.fit_band(series, band, stats) {
            Some(fit) => fit.flags(series.len(), fit.rmse * self.threshold),
            None => vec![OutlierFlag::Clear; series.len()],
        }
    }

    /// Flags as `(date, band)` values of [`OutlierFlag`].
    pub fn screen(&self, series: &PixelTimeSeries) -> (Array2<u8>, ScreenStats) {
        let mut stats = ScreenStats::default();
        let mut flags = Array2::zeros((series.len(), series.band_count()));
        for band in 0..series.band_count() {
            let column = self.screen_band(series, band, &mut stats);
            flags
                .column_mut(band)
                .iter_mut()
                .zip(column)
                .for_each(|(out, flag)| *out = flag.value());
        }
        (flags, stats)
    }
}

/// Band numbers (1-based) used by [`TmaskScreen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmaskBands {
    pub green: usize,
    pub nir: usize,
    pub swir: usize,
}

impl TmaskBands {
    /// Landsat TM/ETM+ band numbering.
    pub fn landsat() -> Self {
        TmaskBands {
            green: 2,
            nir: 4,
            swir: 5,
        }
    }

    fn columns(&self, band_count: usize) -> Result<[usize; 3]> {
        let mut columns = [0; 3];
        for (column, (name, band)) in columns.iter_mut().zip([
            ("green", self.green),
            ("nir", self.nir),
            ("swir", self.swir),
        ]) {
            if band == 0 || band > band_count {
                return Err(RsgisError::InvalidParameter {
                    name,
                    value: band.to_string(),
                    reason: format!("band must be within 1..={band_count}"),
                });
            }
            *column = band - 1;
        }
        Ok(columns)
    }
}

/// How [`TmaskScreen::threshold`] becomes a residual limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualLimit {
    /// The threshold itself, in data units.
    #[default]
    Absolute,
    /// The threshold times the RMSE of each band's fit.
    RmseMultiple,
}

/// Multi-temporal cloud and shadow screen.
///
/// Green, NIR and SWIR bands are fitted like [`OutlierScreen`]. By default
/// the residual limit is the absolute `threshold` in data units; with
/// [`ResidualLimit::RmseMultiple`] it scales with each fit's RMSE instead.
/// A date is cloud when green is a high outlier and shadow when NIR and SWIR
/// are both low outliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TmaskScreen {
    pub bands: TmaskBands,
    pub threshold: f64,
    pub limit: ResidualLimit,
    pub min_observations: usize,
    pub estimator: TukeyBiweight,
}

impl TmaskScreen {
    pub fn new(bands: TmaskBands) -> Self {
        TmaskScreen {
            bands,
            threshold: 40.0,
            limit: ResidualLimit::Absolute,
            min_observations: 12,
            estimator: TukeyBiweight::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: ResidualLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn check(&self, band_count: usize) -> Result<()> {
        self.bands.columns(band_count).map(|_| ())
    }

    pub fn tmask(&self, series: &PixelTimeSeries, stats: &mut ScreenStats) -> Result<Vec<TmaskClass>> {
        let [green, nir, swir] = self.bands.columns(series.band_count())?;
        let screen = OutlierScreen {
            threshold: self.threshold,
            min_observations: self.min_observations,
            estimator: self.estimator,
        };
        let mut flags = |band: usize| match screen.fit_band(series, band, stats) {
            Some(fit) => {
                let limit = match self.limit {
                    ResidualLimit::Absolute => self.threshold,
                    ResidualLimit::RmseMultiple => fit.rmse * self.threshold,
                };
                fit.flags(series.len(), limit)
            }
            None => vec![OutlierFlag::Clear; series.len()],
        };
        let green = flags(green);
        let nir = flags(nir);
        let swir = flags(swir);

        Ok(green
            .into_iter()
            .zip(nir.into_iter().zip(swir))
            .map(|(g, (n, s))| {
                if g == OutlierFlag::High {
                    TmaskClass::Cloud
                } else if n == OutlierFlag::Low && s == OutlierFlag::Low {
                    TmaskClass::Shadow
                } else {
                    TmaskClass::Clear
                }
            })
            .collect())
    }
}
