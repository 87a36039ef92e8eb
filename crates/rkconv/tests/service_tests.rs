//! Upload admission through `ConversionService`.

mod common;

use std::sync::Arc;

use serde_json::{json, Map, Value};

use common::*;
use rkconv::{
    AdmissionError, ConversionError, ConversionRequest, ConversionService, JobStatus, ModelKind,
    ProgressSink, SchedulerError, SubmitOptions,
};

fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn service(harness: &TestHarness) -> ConversionService {
    let scheduler = harness.scheduler(instant_success(), harness.options(1));
    harness.start(&scheduler);
    ConversionService::new(Arc::new(harness.service_config()), Arc::new(scheduler))
}

#[test]
fn test_caffe_pair_is_submitted_with_receipt() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![
        harness.upload("deploy.prototxt", b"layer {}"),
        harness.upload("deploy.caffemodel", b"weights"),
    ];

    let receipt = service
        .submit_upload(&files, &payload(json!({"target_platform": "rk3566"})), SubmitOptions::default())
        .unwrap();

    assert_eq!(receipt.model_type, "caffe");
    assert_eq!(receipt.primary_file, "deploy.prototxt");
    assert_eq!(receipt.secondary_files, vec!["deploy.caffemodel"]);
    assert_eq!(receipt.total_files, 2);
    assert_eq!(
        receipt.output_path,
        harness.output_dir.join(format!("deploy_{}.rknn", receipt.job_id))
    );

    let state = wait_for_status(service.scheduler(), &receipt.job_id, JobStatus::Completed);
    assert_eq!(state.job.model_kind, Some(ModelKind::Caffe));
    assert_eq!(state.job.metadata["uploaded_files_count"], 2);
    assert_eq!(state.job.metadata["model_type"], "caffe");
}

#[test]
fn test_missing_caffemodel_creates_no_job() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("deploy.prototxt", b"layer {}")];

    let err = service
        .submit_upload(&files, &Map::new(), SubmitOptions::default())
        .unwrap_err();

    assert_eq!(
        err,
        AdmissionError::IncompleteBundle("missing .caffemodel weight file".to_string())
    );
    assert!(service.list().is_empty());
}

#[test]
fn test_unrecognised_upload_is_no_valid_model() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("labels.index", b"idx")];

    assert_eq!(
        service
            .submit_upload(&files, &Map::new(), SubmitOptions::default())
            .unwrap_err(),
        AdmissionError::NoValidModel
    );
}

#[test]
fn test_tensorflow_triple_in_any_order() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![
        harness.upload("frozen.index", b"i"),
        harness.upload("frozen.data-00000-of-00001", b"d"),
        harness.upload("frozen.pb", b"g"),
    ];

    let bundle = service.classify_and_validate(&files).unwrap();

    assert_eq!(bundle.kind, ModelKind::Tensorflow);
    assert_eq!(bundle.primary_file.name(), "frozen.pb");
    assert_eq!(bundle.file_count(), 3);
}

#[test]
fn test_disallowed_extension_is_rejected() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![
        harness.upload("model.onnx", b"m"),
        harness.upload("run.sh", b"#!/bin/sh"),
    ];

    assert_eq!(
        service.check_upload(&files),
        Err(AdmissionError::UnsupportedFile {
            name: "run.sh".to_string(),
            extension: ".sh".to_string(),
        })
    );
    assert_eq!(service.check_upload(&[]), Err(AdmissionError::NoFiles));
}

#[test]
fn test_oversized_upload_is_rejected() {
    let harness = TestHarness::new();
    let mut config = harness.service_config();
    config.max_file_size = 4;
    let scheduler = harness.scheduler(instant_success(), harness.options(1));
    let service = ConversionService::new(Arc::new(config), Arc::new(scheduler));
    let files = vec![harness.upload("big.onnx", b"0123456789")];

    assert_eq!(
        service
            .submit_upload(&files, &Map::new(), SubmitOptions::default())
            .unwrap_err(),
        AdmissionError::FileTooLarge {
            name: "big.onnx".to_string(),
            size: 10,
            limit: 4,
        }
    );
}

#[test]
fn test_bad_config_value_rejects_submission() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("model.onnx", b"m")];

    let err = service
        .submit_upload(
            &files,
            &payload(json!({"optimization_level": "maximum"})),
            SubmitOptions::default(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::InvalidConfigField { ref field, .. } if field == "optimization_level"
    ));
    assert!(service.list().is_empty());
}

#[test]
fn test_service_defaults_apply_under_payload() {
    let harness = TestHarness::new();
    let mut config = harness.service_config();
    config.defaults = payload(json!({"target_platform": "rk3562", "optimization_level": 1}));

    // Records the merged options in the artifact itself.
    let executor = |request: &ConversionRequest<'_>, _: &dyn ProgressSink| -> Result<(), ConversionError> {
        let body = format!(
            "{}:{}",
            request.config.target_platform.as_deref().unwrap_or("-"),
            request.config.optimization_level
        );
        std::fs::write(request.output_path, body).map_err(|e| ConversionError::new(e.to_string()))
    };
    let scheduler = harness.scheduler(executor, harness.options(1));
    harness.start(&scheduler);
    let service = ConversionService::new(Arc::new(config), Arc::new(scheduler));
    let files = vec![harness.upload("model.onnx", b"m")];

    let receipt = service
        .submit_upload(
            &files,
            &payload(json!({"optimization_level": 2})),
            SubmitOptions {
                task_id: Some("layered".to_string()),
                ..SubmitOptions::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.job_id, "layered");

    wait_for_status(service.scheduler(), "layered", JobStatus::Completed);
    let written = std::fs::read_to_string(&receipt.output_path).unwrap();
    assert_eq!(written, "rk3562:2");
}

#[test]
fn test_caller_metadata_wins() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("model.onnx", b"m")];

    let mut metadata = Map::new();
    metadata.insert("model_type".to_string(), json!("custom"));
    metadata.insert("owner".to_string(), json!("vision-team"));
    let receipt = service
        .submit_upload(
            &files,
            &Map::new(),
            SubmitOptions {
                metadata,
                ..SubmitOptions::default()
            },
        )
        .unwrap();

    let state = service.get(&receipt.job_id).unwrap();
    assert_eq!(state.job.metadata["model_type"], "custom");
    assert_eq!(state.job.metadata["owner"], "vision-team");
    assert_eq!(state.job.metadata["primary_file"], "model.onnx");
    assert_eq!(receipt.model_type, "onnx");
}

#[test]
fn test_result_path_only_for_completed_jobs() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("model.onnx", b"m")];

    let receipt = service
        .submit_upload(&files, &Map::new(), SubmitOptions::default())
        .unwrap();
    wait_for_status(service.scheduler(), &receipt.job_id, JobStatus::Completed);

    let path = service.result_path(&receipt.job_id).unwrap();
    assert_eq!(path, receipt.output_path);

    std::fs::remove_file(&path).unwrap();
    assert!(matches!(
        service.result_path(&receipt.job_id),
        Err(SchedulerError::ResultUnavailable { .. })
    ));
    assert_eq!(
        service.result_path("missing"),
        Err(SchedulerError::NotFound("missing".to_string()))
    );
}

#[test]
fn test_task_id_cannot_leave_the_output_root() {
    let harness = TestHarness::new();
    let service = service(&harness);
    let files = vec![harness.upload("m.onnx", b"m")];

    let err = service
        .submit_upload(
            &files,
            &Map::new(),
            SubmitOptions {
                task_id: Some("/../../escaped".to_string()),
                ..SubmitOptions::default()
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        AdmissionError::InvalidTaskId { ref id, .. } if id == "/../../escaped"
    ));
    assert!(service.list().is_empty());
    assert!(!harness.root().join("escaped.rknn").exists());
}
