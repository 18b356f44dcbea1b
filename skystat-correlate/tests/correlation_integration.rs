//! End-to-end correlation scenarios.

use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use skystat_core::constants::DEG_TO_RAD;
use skystat_core::{Bound, CircleBound, SkyError, SkyPoint, Vector3};
use skystat_correlate::bins::AngularCorrelation;
use skystat_correlate::correlator::{auto_correlate, CorrelationConfig};
use skystat_correlate::footprint::{Footprint, FootprintPixel};

fn uniform_catalog(footprint: &Footprint, n: usize, seed: u64) -> Vec<SkyPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    footprint.generate_random_points(n, &mut rng)
}

#[test]
fn test_uniform_full_sky_consistent_with_zero() {
    let footprint = Footprint::full_sky();
    let catalog = uniform_catalog(&footprint, 2000, 42);
    let correlation = AngularCorrelation::new(3.0, 30.0, 3).unwrap();
    let config = CorrelationConfig {
        n_random: 2,
        n_regions: 16,
        seed: 42,
        only_pairs: true,
        ..CorrelationConfig::default()
    };
    let result = auto_correlate(&footprint, &catalog, correlation, &config).unwrap();

    assert_eq!(result.n_regions, 16);
    for bin in &result.bins {
        assert!(
            bin.wtheta.abs() < 0.08,
            "uniform sky w = {} at theta = {:.3} deg",
            bin.wtheta,
            bin.theta / DEG_TO_RAD
        );
        assert!(bin.wtheta_error.is_finite() && bin.wtheta_error > 0.0);
    }

    // The covariance diagonal should dominate the off-diagonal terms on
    // average.
    let n = result.covariance.len();
    let mut diagonal = 0.0;
    let mut off_diagonal = 0.0;
    for i in 0..n {
        diagonal += result.covariance[i][i].abs() / n as f64;
        for j in 0..n {
            if i != j {
                off_diagonal += result.covariance[i][j].abs() / (n * (n - 1)) as f64;
            }
        }
    }
    assert!(
        diagonal > off_diagonal,
        "diagonal {:.3e} vs off-diagonal {:.3e}",
        diagonal,
        off_diagonal
    );
}

#[test]
fn test_planted_clustering_detected_at_small_scales() {
    // A 10-degree cap with companions planted 0.2 degrees from a third
    // of the catalog: strong excess in the bin containing 0.2 degrees,
    // nothing significant at degree scales.
    let disk = CircleBound::from_radius(Vector3::from_spherical(0.0, 0.0), 10.0 * DEG_TO_RAD);
    let footprint = Footprint::from_bound(&disk, 5).unwrap();

    let base = uniform_catalog(&footprint, 1000, 42);
    let mut catalog = base.clone();
    for p in base.iter().take(300) {
        let (lon, lat) = p.to_spherical();
        catalog.push(SkyPoint::from_radians(lon + 0.2 * DEG_TO_RAD, lat));
    }

    let correlation = AngularCorrelation::new(0.12, 5.0, 3).unwrap();
    let config = CorrelationConfig {
        n_random: 2,
        seed: 42,
        only_pairs: true,
        ..CorrelationConfig::default()
    };
    let result = auto_correlate(&footprint, &catalog, correlation, &config).unwrap();

    let clustered: Vec<&skystat_correlate::correlator::BinResult> = result
        .bins
        .iter()
        .filter(|bin| bin.theta_min <= 0.2 * DEG_TO_RAD && 0.2 * DEG_TO_RAD <= bin.theta_max)
        .collect();
    assert_eq!(clustered.len(), 1);
    assert!(
        clustered[0].wtheta > 0.1,
        "planted clustering not detected: w = {}",
        clustered[0].wtheta
    );

    for bin in &result.bins {
        if bin.theta_min > 2.0 * DEG_TO_RAD {
            assert!(
                bin.wtheta.abs() < 0.1,
                "large-scale w = {} at theta = {:.2} deg",
                bin.wtheta,
                bin.theta / DEG_TO_RAD
            );
        }
    }
}

#[test]
fn test_twin_catalog_pair_counts_exact() {
    // Well-separated points with twins at a 0.1-degree offset: GG in the
    // bin containing the offset is exactly the ordered twin-pair count,
    // every other bin is empty.
    let m = 8usize;
    let mut catalog = Vec::new();
    for i in 0..m {
        let lon = i as f64 * 40.0;
        let lat = if i % 2 == 0 { 30.0 } else { -30.0 };
        catalog.push(SkyPoint::from_degrees(lon, lat));
        catalog.push(SkyPoint::from_degrees(lon + 0.1, lat));
    }

    let footprint = Footprint::full_sky();
    let correlation = AngularCorrelation::new(0.05, 0.2, 3).unwrap();
    let config = CorrelationConfig {
        seed: 42,
        only_pairs: true,
        ..CorrelationConfig::default()
    };
    let result = auto_correlate(&footprint, &catalog, correlation, &config).unwrap();

    let offset = 0.1 * DEG_TO_RAD * libm::cos(30.0 * DEG_TO_RAD);
    let mut credited = 0usize;
    for bin in &result.bins {
        if bin.theta_min <= offset && offset <= bin.theta_max {
            assert_abs_diff_eq!(bin.gal_gal, 2.0 * m as f64, epsilon = 1e-9);
            credited += 1;
        } else {
            assert_abs_diff_eq!(bin.gal_gal, 0.0, epsilon = 1e-12);
        }
    }
    assert_eq!(credited, 1);
}

#[test]
fn test_odd_region_count_near_equal_areas() {
    let footprint = Footprint::full_sky();
    let catalog = uniform_catalog(&footprint, 400, 42);
    let correlation = AngularCorrelation::new(5.0, 20.0, 3).unwrap();
    let n_regions = 2 * correlation.n_bins() + 1;
    let config = CorrelationConfig {
        n_regions,
        seed: 42,
        only_pairs: true,
        ..CorrelationConfig::default()
    };
    let result = auto_correlate(&footprint, &catalog, correlation, &config).unwrap();
    assert_eq!(result.n_regions, n_regions);
    for bin in &result.bins {
        assert_eq!(bin.region_wtheta.len(), n_regions);
    }
}

#[test]
fn test_empty_footprint_is_invalid_input() {
    assert!(matches!(
        Footprint::from_pixels(vec![]),
        Err(SkyError::InvalidInput { .. })
    ));

    // An all-masked footprint is just as empty.
    let key = skystat_core::PixelKey::from_point(&Vector3::x_axis(), 5);
    assert!(matches!(
        Footprint::from_pixels(vec![FootprintPixel::new(key, 0.0)]),
        Err(SkyError::InvalidInput { .. })
    ));
}

#[test]
fn test_pair_and_pixel_estimators_agree_on_uniform_data() {
    // On a uniform catalog both estimators are consistent with zero, so
    // they agree with each other within a loose combined tolerance.
    let footprint = Footprint::full_sky();
    let catalog = uniform_catalog(&footprint, 2500, 42);

    let pair_config = CorrelationConfig {
        n_random: 1,
        seed: 42,
        only_pairs: true,
        ..CorrelationConfig::default()
    };
    let pair_result = auto_correlate(
        &footprint,
        &catalog,
        AngularCorrelation::new(10.0, 40.0, 3).unwrap(),
        &pair_config,
    )
    .unwrap();

    let pixel_config = CorrelationConfig {
        seed: 42,
        max_level: Some(5),
        ..CorrelationConfig::default()
    };
    let pixel_result = auto_correlate(
        &footprint,
        &catalog,
        AngularCorrelation::new(10.0, 40.0, 3).unwrap(),
        &pixel_config,
    )
    .unwrap();

    for (pair_bin, pixel_bin) in pair_result.bins.iter().zip(&pixel_result.bins) {
        assert!(pixel_bin.level_used.is_some(), "pixel run fell back to pairs");
        assert!(
            (pair_bin.wtheta - pixel_bin.wtheta).abs() < 0.05,
            "estimators disagree: pair {} vs pixel {}",
            pair_bin.wtheta,
            pixel_bin.wtheta
        );
    }
}

#[test]
fn test_masked_footprint_sampling_respects_weights() {
    // A footprint with half-weight pixels receives proportionally fewer
    // randoms there.
    let face = skystat_core::PixelKey::base_faces()[0];
    let children = face.children();
    let pixels = vec![
        FootprintPixel::new(children[0], 1.0),
        FootprintPixel::new(children[1], 0.25),
    ];
    let footprint = Footprint::from_pixels(pixels).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let points = footprint.generate_random_points(5000, &mut rng);
    let mut heavy = 0usize;
    for p in &points {
        assert!(footprint.contains(p));
        if children[0].contains(p) {
            heavy += 1;
        }
    }
    // Expected share 1.0/(1.0 + 0.25) = 0.8 of the samples.
    let share = heavy as f64 / points.len() as f64;
    assert!(
        (share - 0.8).abs() < 0.03,
        "weighted sampling share = {}",
        share
    );
}
