use std::collections::HashMap;
use std::path::{Path, PathBuf};

use checkpoint_prep::candle::{DType, Device, Tensor};
use checkpoint_prep::convert::{ExternalConverter, OnFailure, Outcome};
use checkpoint_prep::{archive, pipeline, AssetFetcher, AssetKind, PrepConfig, PrepError};

/// Serves pre-written files, never touches the network.
struct FixtureFetcher {
    files: HashMap<AssetKind, PathBuf>,
}

impl AssetFetcher for FixtureFetcher {
    fn fetch(&self, kind: AssetKind) -> checkpoint_prep::Result<PathBuf> {
        self.files.get(&kind).cloned().ok_or_else(|| PrepError::Fetch {
            kind,
            source_ref: format!("fixture://{kind}"),
            source: "not in fixture".into(),
        })
    }
}

fn write_fixture(dir: &Path, tensors: HashMap<String, Tensor>) -> FixtureFetcher {
    let src = dir.join("cache");
    std::fs::create_dir_all(&src).unwrap();
    let config = src.join("config.json");
    std::fs::write(&config, r#"{"model_type": "gpt2", "vocab_size": 3, "n_layer": 1, "n_embd": 2}"#).unwrap();
    let vocab = src.join("vocab.json");
    std::fs::write(&vocab, r#"{"a": 0, "b": 1, "ab": 2}"#).unwrap();
    let merges = src.join("merges.txt");
    std::fs::write(&merges, "#version: 0.2\na b\n").unwrap();
    let weights = src.join("model.safetensors");
    checkpoint_prep::candle::safetensors::save(&tensors, &weights).unwrap();
    FixtureFetcher {
        files: HashMap::from([
            (AssetKind::Config, config),
            (AssetKind::Vocab, vocab),
            (AssetKind::Merges, merges),
            (AssetKind::Weights, weights),
        ]),
    }
}

fn gpt2_tensors() -> HashMap<String, Tensor> {
    let dev = Device::Cpu;
    HashMap::from([
        ("wte.weight".to_string(), Tensor::new(&[[1f32, 2.0]], &dev).unwrap()),
        ("h.0.attn.bias".to_string(), Tensor::new(&[0.5f32], &dev).unwrap()),
    ])
}

fn config_for(home: &Path) -> PrepConfig {
    PrepConfig { home_directory: Some(home.to_path_buf()), ..PrepConfig::default() }
}

#[test]
fn test_run_without_converter() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    let config = config_for(&dir.path().join("home"));

    let report = pipeline::run(&config, &fetcher, None).unwrap();
    let target = dir.path().join("home").join("rustbert").join("gpt2");
    assert_eq!(report.target_dir, target);
    assert_eq!(report.source_tensors, 2);
    assert_eq!(report.written_tensors, 3);
    assert!(report.conversion.is_none());
    assert!(!report.converted());

    for file in ["config.json", "vocab.txt", "merges.txt", "model.bin", "model.npz"] {
        assert!(target.join(file).is_file(), "{file} missing");
    }
    assert_eq!(
        std::fs::read_to_string(target.join("vocab.txt")).unwrap(),
        r#"{"a": 0, "b": 1, "ab": 2}"#
    );

    let out = archive::read(target.join("model.npz")).unwrap();
    assert_eq!(
        out.keys().collect::<Vec<_>>(),
        ["lm_head.weight", "transformer.h.0.attn.bias", "transformer.wte.weight"]
    );
    assert_eq!(out.get("transformer.wte.weight").unwrap().to_vec2::<f32>().unwrap(), [[1., 2.]]);
    assert_eq!(out.get("lm_head.weight").unwrap().to_vec2::<f32>().unwrap(), [[1., 2.]]);
    assert_eq!(out.get("transformer.h.0.attn.bias").unwrap().to_vec1::<f32>().unwrap(), [0.5]);
}

#[test]
fn test_runs_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    let a = pipeline::run(&config_for(&dir.path().join("a")), &fetcher, None).unwrap();
    let b = pipeline::run(&config_for(&dir.path().join("b")), &fetcher, None).unwrap();

    assert_eq!(std::fs::read(&a.archive).unwrap(), std::fs::read(&b.archive).unwrap());

    let a = archive::read(&a.archive).unwrap();
    let b = archive::read(&b.archive).unwrap();
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (key, ta) in a.iter() {
        let tb = b.get(key).unwrap();
        assert_eq!(ta.dtype(), DType::F32);
        assert_eq!(ta.dims(), tb.dims(), "{key}");
        assert_eq!(
            ta.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            tb.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            "{key}"
        );
    }
}

#[test]
fn test_inputs_already_in_target_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut fetcher = write_fixture(dir.path(), gpt2_tensors());
    let config = config_for(&dir.path().join("home"));
    let layout = config.layout().unwrap();
    layout.create().unwrap();

    // a previous run left config.json and merges.txt in place
    let model_config = r#"{"model_type": "gpt2", "vocab_size": 3, "n_layer": 1, "n_embd": 2}"#;
    let config_path = layout.path_for(AssetKind::Config);
    std::fs::write(&config_path, model_config).unwrap();
    let merges_path = layout.path_for(AssetKind::Merges);
    std::fs::write(&merges_path, "#version: 0.2\na b\n").unwrap();
    fetcher.files.insert(AssetKind::Config, config_path.clone());
    fetcher.files.insert(AssetKind::Merges, merges_path.clone());

    let report = pipeline::run(&config, &fetcher, None).unwrap();
    assert_eq!(report.written_tensors, 3);
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), model_config);
    assert_eq!(std::fs::read_to_string(&merges_path).unwrap(), "#version: 0.2\na b\n");

    // and again, now that every asset but the weights sits in the target
    fetcher.files.insert(AssetKind::Vocab, layout.path_for(AssetKind::Vocab));
    pipeline::run(&config, &fetcher, None).unwrap();
    assert_eq!(
        std::fs::read_to_string(layout.path_for(AssetKind::Vocab)).unwrap(),
        r#"{"a": 0, "b": 1, "ab": 2}"#
    );
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), model_config);
}

#[test]
fn test_empty_checkpoint_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), HashMap::new());
    let config = config_for(&dir.path().join("home"));
    let err = pipeline::run(&config, &fetcher, None).unwrap_err();
    assert!(matches!(err, PrepError::EmptyCheckpoint));
    assert!(!config.layout().unwrap().archive().exists());
}

#[test]
fn test_uncreatable_target_fails_before_remap() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    // a regular file where the home directory should be
    let home = dir.path().join("home");
    std::fs::write(&home, "").unwrap();
    let err = pipeline::run(&config_for(&home), &fetcher, None).unwrap_err();
    assert!(matches!(err, PrepError::Io { .. }), "{err}");
}

#[test]
fn test_fetch_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let mut fetcher = write_fixture(dir.path(), gpt2_tensors());
    fetcher.files.remove(&AssetKind::Merges);
    let config = config_for(&dir.path().join("home"));
    let err = pipeline::run(&config, &fetcher, None).unwrap_err();
    assert!(matches!(err, PrepError::Fetch { kind: AssetKind::Merges, .. }));
    assert!(!config.layout().unwrap().root().exists());
}

#[test]
fn test_invalid_model_config() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    std::fs::write(&fetcher.files[&AssetKind::Config], "not json").unwrap();
    let config = config_for(&dir.path().join("home"));
    let err = pipeline::run(&config, &fetcher, None).unwrap_err();
    assert!(matches!(err, PrepError::ModelConfig { .. }), "{err}");
    let msg = err.to_string();
    assert!(msg.contains("model config"), "{msg}");
}

#[cfg(unix)]
#[test]
fn test_run_with_converter() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    let config = config_for(&dir.path().join("home"));
    let converter = ExternalConverter::new("sh").with_args(vec!["-c".into(), r#"cp "$0" "$1""#.into()]);

    let report = pipeline::run(&config, &fetcher, Some(&converter)).unwrap();
    assert!(report.converted());
    let layout = config.layout().unwrap();
    assert_eq!(std::fs::read(layout.converted()).unwrap(), std::fs::read(layout.archive()).unwrap());
    assert!(layout.missing().is_empty());
}

#[cfg(unix)]
#[test]
fn test_converter_failure_policies() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = write_fixture(dir.path(), gpt2_tensors());
    let config = config_for(&dir.path().join("home"));

    let strict = ExternalConverter::new("false");
    let err = pipeline::run(&config, &fetcher, Some(&strict)).unwrap_err();
    assert!(matches!(err, PrepError::Conversion { .. }));
    // the archive is already on disk by then
    assert!(config.layout().unwrap().archive().is_file());

    let lenient = ExternalConverter::new("false").with_on_failure(OnFailure::Warn);
    let report = pipeline::run(&config, &fetcher, Some(&lenient)).unwrap();
    assert!(matches!(report.conversion, Some(Outcome::FailedIgnored(_))));
}
