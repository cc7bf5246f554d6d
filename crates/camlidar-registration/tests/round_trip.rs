use camlidar_core::synthetic::noise::UniformPointNoise;
use camlidar_core::synthetic::scene::{
    four_board_layout, ground_with_clutter, lidar_from_camera, CalibrationScene,
};
use camlidar_core::{rotation_angle, Iso3, Real, Vec3};
use camlidar_registration::{
    register, register_input, CorrespondenceFilter, RegistrationConfig, RegistrationInput,
    RegistrationReport, SearchOptions, SearchTermination,
};

fn quick_config() -> RegistrationConfig {
    RegistrationConfig {
        search: SearchOptions {
            tau_comb: 5,
            min_iterations: 200,
            max_iterations: 5_000,
            seed: 17,
            skip_repeated_hypotheses: true,
            ..SearchOptions::default()
        },
        ..RegistrationConfig::default()
    }
}

fn truth() -> Iso3 {
    lidar_from_camera(0.03, -0.02, 0.05, Vec3::new(0.12, -0.2, 0.08))
}

fn assert_close_to(report: &RegistrationReport, truth: &Iso3, max_deg: Real, max_trans: Real) {
    let r_true = truth.rotation.to_rotation_matrix().into_inner();
    let angle = rotation_angle(&report.rotation(), &r_true).to_degrees();
    let dt = (report.translation() - truth.translation.vector).norm();
    assert!(angle < max_deg, "rotation error {:.4} deg", angle);
    assert!(dt < max_trans, "translation error {:.4}", dt);
}

#[test]
fn noiseless_scene_recovers_ground_truth() -> anyhow::Result<()> {
    let truth = truth();
    let scene = CalibrationScene::four_boards(truth)?;
    let report = register(
        &scene.camera_boards,
        &scene.lidar_boards,
        &scene.lidar_cloud,
        &quick_config(),
    )?;

    // scene spans about 6 m; 1% of that is 0.06
    assert_close_to(&report, &truth, 1.0, 0.06);
    assert!(report.residual < 1e-6, "residual {}", report.residual);
    assert_eq!(report.camera_descriptors.len(), 4);
    assert_eq!(report.lidar_descriptors.len(), 4);

    let stats = report.search.as_ref().expect("search stats");
    assert!(stats.iterations <= 5_000);
    assert!(stats.evaluated > 0);
    assert!(!report.candidates.is_empty());
    assert!(report.candidates.len() <= 5);
    assert_eq!(
        report.residual,
        report.candidates[report.best_candidate].residual
    );
    for c in &report.candidates {
        assert!(c.residual <= c.initial_residual());
    }
    Ok(())
}

#[test]
fn noisy_scene_recovers_ground_truth() -> anyhow::Result<()> {
    let truth = truth();
    let background = ground_with_clutter(-1.5, (-6.0, 0.0), (-3.0, 3.0), 0.25, 150, 0.6, 3);
    let scene = CalibrationScene::from_lidar_boards(
        &four_board_layout(),
        background,
        truth,
        UniformPointNoise {
            seed: 1,
            max_abs: 0.003,
        },
        UniformPointNoise {
            seed: 2,
            max_abs: 0.003,
        },
    )?;
    let report = register(
        &scene.camera_boards,
        &scene.lidar_boards,
        &scene.lidar_cloud,
        &quick_config(),
    )?;
    assert_close_to(&report, &truth, 1.0, 0.06);
    Ok(())
}

#[test]
fn robust_refinement_recovers_ground_truth() -> anyhow::Result<()> {
    let truth = truth();
    let scene = CalibrationScene::four_boards(truth)?;
    let mut config = quick_config();
    config.refine.filter = CorrespondenceFilter::ransac();
    config.refine.parallel = false;
    let report = register(
        &scene.camera_boards,
        &scene.lidar_boards,
        &scene.lidar_cloud,
        &config,
    )?;
    assert_close_to(&report, &truth, 1.0, 0.06);
    Ok(())
}

#[test]
fn bundled_input_matches_board_sets() -> anyhow::Result<()> {
    let truth = truth();
    let scene = CalibrationScene::four_boards(truth)?;
    let input = RegistrationInput {
        camera_boards: scene
            .camera_boards
            .boards
            .iter()
            .map(|b| b.points.clone())
            .collect(),
        lidar_boards: scene
            .lidar_boards
            .boards
            .iter()
            .map(|b| b.points.clone())
            .collect(),
        lidar_cloud: scene.lidar_cloud.clone(),
    };
    let config = quick_config();
    let a = register_input(&input, &config)?;
    let b = register(
        &scene.camera_boards,
        &scene.lidar_boards,
        &scene.lidar_cloud,
        &config,
    )?;
    // same seed, same inputs
    assert_eq!(a.transform, b.transform);
    assert_eq!(a.residual, b.residual);
    Ok(())
}

#[test]
fn report_serializes_to_json() -> anyhow::Result<()> {
    let scene = CalibrationScene::four_boards(truth())?;
    let report = register(
        &scene.camera_boards,
        &scene.lidar_boards,
        &scene.lidar_cloud,
        &quick_config(),
    )?;
    let json = report.to_json()?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert!(value.get("transform").is_some());
    assert_eq!(
        value["candidates"].as_array().map(|c| c.len()),
        Some(report.candidates.len())
    );

    let back: RegistrationReport = serde_json::from_str(&json)?;
    assert!((back.translation() - report.translation()).norm() < 1e-12);
    let stats = back.search.expect("search stats");
    assert!(matches!(
        stats.termination,
        SearchTermination::TargetReached
            | SearchTermination::HypothesesExhausted
            | SearchTermination::IterationBudget
    ));
    Ok(())
}
