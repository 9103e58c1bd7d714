use lse_algo::{
    assemble, calibration_matrix, classify, resolve_full, test_utils, CalibrationReduction,
};
use lse_core::{CalibrationSetting, EstimatorConfig, GaussSolver, NetworkModel, NodeId, PhaseMode};

fn reduce(model: &mut NetworkModel) -> (lse_algo::SystemMatrices, CalibrationReduction) {
    let partition = resolve_full(model).unwrap();
    let assignment = classify(model, &partition).unwrap();
    let matrices =
        assemble(model, &assignment, &EstimatorConfig::default(), &GaussSolver::default())
            .unwrap();
    let reduction = calibration_matrix(model, &assignment, &matrices.series);
    (matrices, reduction)
}

#[test]
fn fully_active_network_keeps_the_series_partition() {
    let mut model = test_utils::substation_model(PhaseMode::PositiveSequence);
    let (matrices, reduction) = reduce(&mut model);
    let k = matrices.series.as_ref().unwrap();
    let kcal = reduction.matrix.as_ref().unwrap();
    assert_eq!(kcal.shape(), k.shape());
    assert!(reduction.dropped_rows.is_empty());
    for (r, c, v) in k.entries() {
        assert_eq!(kcal.get(r, c), v);
    }
}

#[test]
fn passive_flow_removes_exactly_one_row() {
    let mut model = test_utils::substation_model(PhaseMode::PositiveSequence);
    let (_, before) = reduce(&mut model);
    model.current_flows[0].group.set_calibration(CalibrationSetting::Passive);
    let (matrices, after) = reduce(&mut model);

    let before = before.matrix.unwrap();
    let after_k = after.matrix.as_ref().unwrap();
    assert_eq!(after_k.rows(), before.rows() - 1);
    assert_eq!(after_k.cols(), before.cols());
    assert_eq!(after.dropped_rows, vec![0]);
    // the surviving row is the transformer flow
    let k = matrices.series.as_ref().unwrap();
    for c in 0..k.cols() {
        assert_eq!(after_k.get(0, c), k.get(1, c));
    }
}

#[test]
fn passive_flow_removes_a_three_row_block_in_three_phase() {
    let mut model = test_utils::substation_model(PhaseMode::ThreePhase);
    let (_, before) = reduce(&mut model);
    model.current_flows[1].group.set_calibration(CalibrationSetting::Passive);
    let (_, after) = reduce(&mut model);
    let rows_before = before.matrix.unwrap().rows();
    let rows_after = after.matrix.unwrap().rows();
    assert_eq!(rows_before - rows_after, 3);
    assert_eq!(after.dropped_rows, vec![5, 4, 3]);
}

#[test]
fn single_non_active_phase_drops_the_row() {
    let mut model = test_utils::substation_model(PhaseMode::PositiveSequence);
    model.current_flows[1].group.phases[2].calibration = CalibrationSetting::Perfect;
    let (_, reduction) = reduce(&mut model);
    assert_eq!(reduction.dropped_rows, vec![1]);
}

#[test]
fn bus_without_reference_meter_loses_its_column() {
    let mut model = test_utils::substation_model(PhaseMode::PositiveSequence);
    let b1 = model.node_index(NodeId::new(3)).unwrap();
    if let Some(group) = model.graph[b1].voltage.as_mut() {
        group.set_calibration(CalibrationSetting::Passive);
    }
    let a1 = model.node_index(NodeId::new(1)).unwrap();
    if let Some(group) = model.graph[a1].voltage.as_mut() {
        group.set_calibration(CalibrationSetting::Perfect);
    }
    let (matrices, reduction) = reduce(&mut model);
    let k = matrices.series.as_ref().unwrap();
    let kcal = reduction.matrix.as_ref().unwrap();
    assert_eq!(reduction.dropped_columns, vec![1]);
    assert_eq!(kcal.shape(), (k.rows(), k.cols() - 1));
    assert_eq!(kcal.get(1, 1), k.get(1, 2));
}

#[test]
fn reduction_never_grows() {
    let settings = [
        CalibrationSetting::Active,
        CalibrationSetting::Passive,
        CalibrationSetting::Perfect,
    ];
    for mode in [PhaseMode::PositiveSequence, PhaseMode::ThreePhase] {
        for (i, &flow_setting) in settings.iter().enumerate() {
            let mut model = test_utils::substation_model(mode);
            model.current_flows[i % 2].group.set_calibration(flow_setting);
            let c1 = model.node_index(NodeId::new(5)).unwrap();
            if let Some(group) = model.graph[c1].voltage.as_mut() {
                group.set_calibration(settings[(i + 1) % 3]);
            }
            let (matrices, reduction) = reduce(&mut model);
            let k = matrices.series.unwrap();
            if let Ok(kcal) = reduction.matrix {
                assert!(kcal.rows() <= k.rows());
                assert!(kcal.cols() <= k.cols());
            }
        }
    }
}

#[test]
fn absent_series_partition_gives_absent_calibration() {
    let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
    model.current_flows[0].group.set_calibration(CalibrationSetting::Inactive);
    let (_, reduction) = reduce(&mut model);
    assert_eq!(reduction.matrix.unwrap_err().0, lse_algo::Partition::Calibration);
}
