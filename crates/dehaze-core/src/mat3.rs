//! Symmetric 3x3 matrix algebra over pipeline buffers.
//!
//! The guided filter inverts one covariance matrix per pixel. Rather than
//! juggling six anonymous buffers, the six independent entries live in
//! [`SymMat3`], generic over [`Arith`]: instantiated with an image buffer it
//! computes whole cofactor fields in a handful of elementwise operations,
//! instantiated with `f32` (in tests) the same code paths are checked against
//! a brute-force inverse.

use crate::error::DehazeError;
use crate::image::Arith;

/// Entries of a symmetric 3x3 matrix:
///
/// ```text
/// | rr rg rb |
/// | rg gg gb |
/// | rb gb bb |
/// ```
pub struct SymMat3<T> {
    pub rr: T,
    pub rg: T,
    pub rb: T,
    pub gg: T,
    pub gb: T,
    pub bb: T,
}

impl<T: Arith> SymMat3<T> {
    /// The six independent cofactors. For a symmetric matrix the cofactor
    /// matrix is itself symmetric.
    pub fn cofactors(&self) -> Result<SymMat3<T>, DehazeError> {
        Ok(SymMat3 {
            rr: self.gg.mul(&self.bb)?.sub(&self.gb.mul(&self.gb)?)?,
            rg: self.gb.mul(&self.rb)?.sub(&self.rg.mul(&self.bb)?)?,
            rb: self.rg.mul(&self.gb)?.sub(&self.gg.mul(&self.rb)?)?,
            gg: self.rr.mul(&self.bb)?.sub(&self.rb.mul(&self.rb)?)?,
            gb: self.rb.mul(&self.rg)?.sub(&self.rr.mul(&self.gb)?)?,
            bb: self.rr.mul(&self.gg)?.sub(&self.rg.mul(&self.rg)?)?,
        })
    }

    /// Laplace expansion along the first row: dot of the first cofactor row
    /// with the first matrix row.
    pub fn determinant(&self, cofactors: &SymMat3<T>) -> Result<T, DehazeError> {
        cofactors
            .rr
            .mul(&self.rr)?
            .add(&cofactors.rg.mul(&self.rg)?)?
            .add(&cofactors.rb.mul(&self.rb)?)
    }

    /// Analytic inverse: cofactors divided by the determinant. A determinant
    /// of zero (unregularized, flat windows) divides through and propagates
    /// non-finite values for the downstream patch step.
    pub fn inverse(&self) -> Result<SymMat3<T>, DehazeError> {
        let cof = self.cofactors()?;
        let det = self.determinant(&cof)?;
        Ok(SymMat3 {
            rr: cof.rr.div(&det)?,
            rg: cof.rg.div(&det)?,
            rb: cof.rb.div(&det)?,
            gg: cof.gg.div(&det)?,
            gb: cof.gb.div(&det)?,
            bb: cof.bb.div(&det)?,
        })
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: [&T; 3]) -> Result<[T; 3], DehazeError> {
        Ok([
            self.rr.mul(v[0])?.add(&self.rg.mul(v[1])?)?.add(&self.rb.mul(v[2])?)?,
            self.rg.mul(v[0])?.add(&self.gg.mul(v[1])?)?.add(&self.gb.mul(v[2])?)?,
            self.rb.mul(v[0])?.add(&self.gb.mul(v[1])?)?.add(&self.bb.mul(v[2])?)?,
        ])
    }
}
