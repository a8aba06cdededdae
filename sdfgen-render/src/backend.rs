//! Backend strategy.
//!
//! Both rasterizers take validated parameters and a sorted outline and
//! produce the same bytes; the dispatcher in [`crate::generator`] decides
//! which one runs.

use std::convert::Infallible;
use std::fmt;

use sdfgen_core::{cpu, Outline, ResolvedParams, SdfField};

use crate::error::GpuError;
use crate::gpu::GpuRasterizer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Cpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gpu => f.write_str("gpu"),
            BackendKind::Cpu => f.write_str("cpu"),
        }
    }
}

pub trait SdfBackend {
    type Error: std::error::Error;

    fn kind(&self) -> BackendKind;

    fn generate(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
    ) -> Result<SdfField, Self::Error>;
}

/// The reference rasterizer. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl SdfBackend for CpuBackend {
    type Error = Infallible;

    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn generate(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
    ) -> Result<SdfField, Infallible> {
        Ok(cpu::generate(params, outline))
    }
}

impl SdfBackend for GpuRasterizer {
    type Error = GpuError;

    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn generate(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
    ) -> Result<SdfField, GpuError> {
        GpuRasterizer::generate(self, params, outline)
    }
}
