//! Angular math for positional cross-matching.

/// Degree-to-radian conversion factor
pub const D2R: f64 = 0.017453292519943295;

/// Great-circle separation between two positions given in decimal degrees,
/// returned in arcseconds. Haversine form, which stays accurate at the small
/// separations we care about.
pub fn angular_separation_arcsec(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let ra1 = ra1_deg * D2R;
    let dec1 = dec1_deg * D2R;
    let ra2 = ra2_deg * D2R;
    let dec2 = dec2_deg * D2R;

    let sd = ((dec2 - dec1) / 2.).sin();
    let sr = ((ra2 - ra1) / 2.).sin();
    let h = sd * sd + dec1.cos() * dec2.cos() * sr * sr;

    2. * h.sqrt().asin() / D2R * 3600.
}

/// Bounding region for a cone search: one declination band plus one or two RA
/// ranges. Two ranges appear when the widened RA window crosses 0/360.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeBounds {
    pub dec_min: f64,
    pub dec_max: f64,
    pub ra_range: (f64, f64),
    pub ra_wrap_range: Option<(f64, f64)>,
}

impl ConeBounds {
    pub fn new(ra_deg: f64, dec_deg: f64, radius_arcsec: f64) -> Self {
        let radius_deg = radius_arcsec / 3600.0;
        let dec_min = f64::max(dec_deg - radius_deg, -90.0);
        let dec_max = f64::min(dec_deg + radius_deg, 90.0);

        // Widen the RA window by the cosine of the declination closest to a
        // pole within the band.
        let cos_dec = f64::min(f64::cos(dec_min * D2R), f64::cos(dec_max * D2R));

        let (ra_range, ra_wrap_range) = if cos_dec <= 0. {
            ((0., 360.0), None)
        } else {
            let search_radius_ra = radius_deg / cos_dec;
            let min_ra = ra_deg - search_radius_ra;
            let max_ra = ra_deg + search_radius_ra;

            if min_ra <= 0. && max_ra >= 360. {
                // We cover all RA's, which might happen with a reasonable
                // radius if we're right at the poles. This is OK.
                ((0., 360.0), None)
            } else if min_ra < 0. {
                // We need to break our search into two RA chunks:
                // (0, naive-max) and (wrapped-naive-min, 360)
                ((0., max_ra), Some((min_ra + 360., 360.)))
            } else if max_ra > 360. {
                // Analogous to the previous case
                ((min_ra, 360.), Some((0., max_ra - 360.)))
            } else {
                ((min_ra, max_ra), None)
            }
        };

        ConeBounds {
            dec_min,
            dec_max,
            ra_range,
            ra_wrap_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn separation_of_identical_points_is_zero() {
        assert_relative_eq!(
            angular_separation_arcsec(110.615, -5.67733, 110.615, -5.67733),
            0.0
        );
    }

    #[test]
    fn separation_matches_a_pure_dec_offset() {
        // 83 arcsec north of the reference position.
        let sep = angular_separation_arcsec(110.615, -5.67733, 110.615, -5.67733 + 83.0 / 3600.0);
        assert_relative_eq!(sep, 83.0, epsilon = 1e-6);
    }

    #[test]
    fn bounds_stay_simple_away_from_wrap() {
        let b = ConeBounds::new(110.615, -5.67733, 60.0);
        assert!(b.dec_min < -5.67733 && b.dec_max > -5.67733);
        assert!(b.ra_range.0 < 110.615 && b.ra_range.1 > 110.615);
        assert!(b.ra_wrap_range.is_none());
    }

    #[test]
    fn bounds_split_at_ra_zero() {
        let b = ConeBounds::new(0.001, 10.0, 60.0);
        assert_eq!(b.ra_range.0, 0.0);
        let wrap = b.ra_wrap_range.expect("window should wrap past RA 0");
        assert_eq!(wrap.1, 360.0);
        assert!(wrap.0 > 359.0);
    }

    #[test]
    fn bounds_cover_all_ra_at_the_pole() {
        let b = ConeBounds::new(42.0, 89.9999, 60.0);
        assert_eq!(b.ra_range, (0.0, 360.0));
        assert!(b.ra_wrap_range.is_none());
    }
}
