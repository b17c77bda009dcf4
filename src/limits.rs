//! Resource ceilings applied before any expensive operation.
//!
//! Every persist, describe, or recurse step consults [`Limits`] first, so
//! cost and memory stay bounded no matter what arrives on disk: a 40 000-px
//! scan, a zip with ten thousand members, a page stuffed with hundreds of
//! tracking-pixel images. The struct is plain read-only data — it is shared
//! freely across concurrent documents without locking.
//!
//! [`PageQuota`] is the one piece of counting state, and it is deliberately
//! scoped to a single page: each page gets a fresh counter, so a gallery
//! page cannot starve the pages after it.

use serde::{Deserialize, Serialize};

/// Policy ceilings for image, vision-call, and archive handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Minimum pixel area (width × height) for an embedded image to be worth
    /// saving and describing. Smaller images are icons, rules, and tracking
    /// pixels; they are silently skipped. Default: 200 × 200.
    pub min_image_pixels: u32,

    /// Maximum vision description calls per page of a paged document.
    /// Default: 50.
    pub max_vision_calls_per_page: u32,

    /// Maximum image dimension (width or height) in pixels before
    /// proportional downscaling. Default: 3000.
    pub max_image_dim: u32,

    /// Maximum image file byte size before downscaling is attempted.
    /// Default: 10 MiB.
    pub max_image_bytes: u64,

    /// Maximum total archive byte size; larger archives are rejected without
    /// opening a single member. Default: 100 MiB.
    pub max_archive_bytes: u64,

    /// Maximum number of non-directory archive members to process; members
    /// past this count are never opened. Default: 50.
    pub max_archive_members: usize,

    /// Maximum archive nesting depth for recursive member processing.
    /// Default: 2 (an archive inside an archive, no further).
    pub max_archive_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_image_pixels: 200 * 200,
            max_vision_calls_per_page: 50,
            max_image_dim: 3000,
            max_image_bytes: 10 * 1024 * 1024,
            max_archive_bytes: 100 * 1024 * 1024,
            max_archive_members: 50,
            max_archive_depth: 2,
        }
    }
}

impl Limits {
    /// Is an embedded image large enough to save and describe?
    #[must_use]
    pub fn worth_describing(&self, width: u32, height: u32) -> bool {
        width.saturating_mul(height) >= self.min_image_pixels
    }

    /// Does an archive's total byte size fit under the ceiling?
    #[must_use]
    pub fn archive_fits(&self, total_bytes: u64) -> bool {
        total_bytes <= self.max_archive_bytes
    }

    /// Target dimensions after proportional downscaling, or `None` when the
    /// image already fits.
    ///
    /// The longer side lands exactly on `max_image_dim`; the shorter side is
    /// scaled by the same factor and rounded. Never upscales.
    #[must_use]
    pub fn downscale_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let longer = width.max(height);
        if longer <= self.max_image_dim || longer == 0 {
            return None;
        }
        let cap = self.max_image_dim as f64;
        let scale = cap / longer as f64;
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        Some((w, h))
    }
}

/// Per-page counter of vision description calls.
///
/// Reset by constructing a fresh quota at the start of each page; `used`
/// can never exceed `limit` because the only mutation is the guarded
/// [`PageQuota::try_acquire`].
#[derive(Debug)]
pub struct PageQuota {
    limit: u32,
    used: u32,
}

impl PageQuota {
    /// A fresh quota for one page's processing.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Reserve one call slot. Returns `false` (without counting) once the
    /// page's allotment is spent; the caller emits the fixed placeholder
    /// instead of calling the service.
    pub fn try_acquire(&mut self) -> bool {
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }

    /// Calls made so far on this page.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let l = Limits::default();
        assert_eq!(l.min_image_pixels, 40_000);
        assert_eq!(l.max_vision_calls_per_page, 50);
        assert_eq!(l.max_image_dim, 3000);
        assert_eq!(l.max_archive_members, 50);
    }

    #[test]
    fn small_images_not_worth_describing() {
        let l = Limits::default();
        assert!(!l.worth_describing(199, 199));
        assert!(!l.worth_describing(10, 10));
        assert!(l.worth_describing(200, 200));
        assert!(l.worth_describing(1000, 50)); // area rule, not per-side
    }

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let l = Limits::default();
        // 6000×4000 with a 3000 cap → 3000×2000
        assert_eq!(l.downscale_dimensions(6000, 4000), Some((3000, 2000)));
        // portrait orientation: longer side is the height
        assert_eq!(l.downscale_dimensions(4000, 6000), Some((2000, 3000)));
    }

    #[test]
    fn downscale_never_upscales() {
        let l = Limits::default();
        assert_eq!(l.downscale_dimensions(3000, 2000), None);
        assert_eq!(l.downscale_dimensions(10, 10), None);
        assert_eq!(l.downscale_dimensions(0, 0), None);
    }

    #[test]
    fn archive_ceiling_is_inclusive() {
        let l = Limits {
            max_archive_bytes: 100,
            ..Limits::default()
        };
        assert!(l.archive_fits(100));
        assert!(!l.archive_fits(101));
    }

    #[test]
    fn quota_never_exceeds_limit() {
        let mut q = PageQuota::new(2);
        assert!(q.try_acquire());
        assert!(q.try_acquire());
        assert!(!q.try_acquire());
        assert!(!q.try_acquire());
        assert_eq!(q.used(), 2);
    }

    #[test]
    fn zero_quota_denies_immediately() {
        let mut q = PageQuota::new(0);
        assert!(!q.try_acquire());
        assert_eq!(q.used(), 0);
    }
}
