//! Per-job conversion parameters passed through to the RKNN toolkit.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::AdmissionError;

const DEFAULT_DATASET: &str = "./images.txt";

/// Normalisation values, either one list for all inputs or one per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValues {
    Shared(Vec<f64>),
    PerInput(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub mean_values: ChannelValues,
    pub std_values: ChannelValues,
    pub quantized_dtype: String,
    pub quantized_algorithm: String,
    pub quantized_method: String,
    pub quantized_hybrid_level: i64,
    pub target_platform: Option<String>,
    #[serde(rename = "quant_img_RGB2BGR")]
    pub quant_img_rgb2bgr: bool,
    pub float_dtype: String,
    pub optimization_level: i64,
    pub custom_string: Option<String>,
    pub remove_weight: bool,
    pub compress_weight: bool,
    pub inputs_yuv_fmt: Option<String>,
    pub single_core_mode: bool,
    pub dynamic_input: Option<Vec<Vec<Vec<i64>>>>,
    pub model_pruning: bool,
    pub op_target: Option<BTreeMap<String, String>>,
    pub quantize_weight: bool,
    pub remove_reshape: bool,
    pub sparse_infer: bool,
    pub enable_flash_attention: bool,
    pub auto_hybrid_cos_thresh: f64,
    pub auto_hybrid_euc_thresh: Option<f64>,

    pub do_quantization: bool,
    pub dataset: String,
    pub rknn_batch_size: Option<i64>,
    pub auto_hybrid: bool,

    pub input_size_list: Vec<Vec<i64>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            mean_values: ChannelValues::Shared(vec![0.0, 0.0, 0.0]),
            std_values: ChannelValues::Shared(vec![255.0, 255.0, 255.0]),
            quantized_dtype: "w8a8".to_string(),
            quantized_algorithm: "normal".to_string(),
            quantized_method: "channel".to_string(),
            quantized_hybrid_level: 0,
            target_platform: Some("rk3588".to_string()),
            quant_img_rgb2bgr: false,
            float_dtype: "float16".to_string(),
            optimization_level: 3,
            custom_string: None,
            remove_weight: false,
            compress_weight: false,
            inputs_yuv_fmt: None,
            single_core_mode: false,
            dynamic_input: None,
            model_pruning: false,
            op_target: None,
            quantize_weight: false,
            remove_reshape: false,
            sparse_infer: false,
            enable_flash_attention: false,
            auto_hybrid_cos_thresh: 0.98,
            auto_hybrid_euc_thresh: None,
            do_quantization: true,
            dataset: DEFAULT_DATASET.to_string(),
            rknn_batch_size: None,
            auto_hybrid: false,
            input_size_list: vec![vec![1, 3, 224, 224]],
        }
    }
}

fn field<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, AdmissionError> {
    serde_json::from_value(value.clone()).map_err(|e| AdmissionError::InvalidConfigField {
        field: key.to_string(),
        reason: e.to_string(),
    })
}

impl ConversionConfig {
    /// Returns a copy with the named fields of `partial` applied. Unknown
    /// keys are skipped; a known key with a value of the wrong shape fails
    /// the whole merge.
    pub fn merge(&self, partial: &Map<String, Value>) -> Result<Self, AdmissionError> {
        let mut merged = self.clone();
        for (key, value) in partial {
            let k = key.as_str();
            match k {
                "mean_values" => merged.mean_values = field(k, value)?,
                "std_values" => merged.std_values = field(k, value)?,
                "quantized_dtype" => merged.quantized_dtype = field(k, value)?,
                "quantized_algorithm" => merged.quantized_algorithm = field(k, value)?,
                "quantized_method" => merged.quantized_method = field(k, value)?,
                "quantized_hybrid_level" => merged.quantized_hybrid_level = field(k, value)?,
                "target_platform" => merged.target_platform = field(k, value)?,
                "quant_img_RGB2BGR" => merged.quant_img_rgb2bgr = field(k, value)?,
                "float_dtype" => merged.float_dtype = field(k, value)?,
                "optimization_level" => merged.optimization_level = field(k, value)?,
                "custom_string" => merged.custom_string = field(k, value)?,
                "remove_weight" => merged.remove_weight = field(k, value)?,
                "compress_weight" => merged.compress_weight = field(k, value)?,
                "inputs_yuv_fmt" => merged.inputs_yuv_fmt = field(k, value)?,
                "single_core_mode" => merged.single_core_mode = field(k, value)?,
                "dynamic_input" => merged.dynamic_input = field(k, value)?,
                "model_pruning" => merged.model_pruning = field(k, value)?,
                "op_target" => merged.op_target = field(k, value)?,
                "quantize_weight" => merged.quantize_weight = field(k, value)?,
                "remove_reshape" => merged.remove_reshape = field(k, value)?,
                "sparse_infer" => merged.sparse_infer = field(k, value)?,
                "enable_flash_attention" => merged.enable_flash_attention = field(k, value)?,
                "auto_hybrid_cos_thresh" => merged.auto_hybrid_cos_thresh = field(k, value)?,
                "auto_hybrid_euc_thresh" => merged.auto_hybrid_euc_thresh = field(k, value)?,
                "do_quantization" => merged.do_quantization = field(k, value)?,
                "dataset" => merged.dataset = field(k, value)?,
                "rknn_batch_size" => merged.rknn_batch_size = field(k, value)?,
                "auto_hybrid" => merged.auto_hybrid = field(k, value)?,
                "input_size_list" => merged.input_size_list = field(k, value)?,
                other => log::debug!("Ignoring unknown conversion option '{}'", other),
            }
        }
        Ok(merged)
    }

    /// Defaults, then service-level defaults, then the request payload.
    pub fn from_layers(
        service_defaults: &Map<String, Value>,
        payload: &Map<String, Value>,
    ) -> Result<Self, AdmissionError> {
        Self::default().merge(service_defaults)?.merge(payload)
    }

    pub fn dataset_path(&self) -> &str {
        if self.dataset.trim().is_empty() {
            DEFAULT_DATASET
        } else {
            &self.dataset
        }
    }

    /// Options for the toolkit's `config()` call.
    pub fn toolkit_config(&self) -> Value {
        json!({
            "mean_values": self.mean_values,
            "std_values": self.std_values,
            "quantized_dtype": self.quantized_dtype,
            "quantized_algorithm": self.quantized_algorithm,
            "quantized_method": self.quantized_method,
            "quantized_hybrid_level": self.quantized_hybrid_level,
            "target_platform": self.target_platform,
            "quant_img_RGB2BGR": self.quant_img_rgb2bgr,
            "float_dtype": self.float_dtype,
            "optimization_level": self.optimization_level,
            "custom_string": self.custom_string,
            "remove_weight": self.remove_weight,
            "compress_weight": self.compress_weight,
            "inputs_yuv_fmt": self.inputs_yuv_fmt,
            "single_core_mode": self.single_core_mode,
            "dynamic_input": self.dynamic_input,
            "model_pruning": self.model_pruning,
            "op_target": self.op_target,
            "quantize_weight": self.quantize_weight,
            "remove_reshape": self.remove_reshape,
            "sparse_infer": self.sparse_infer,
            "enable_flash_attention": self.enable_flash_attention,
            "auto_hybrid_cos_thresh": self.auto_hybrid_cos_thresh,
            "auto_hybrid_euc_thresh": self.auto_hybrid_euc_thresh,
        })
    }

    /// Options for the toolkit's `build()` call.
    pub fn build_config(&self) -> Value {
        json!({
            "do_quantization": self.do_quantization,
            "dataset": self.dataset_path(),
            "rknn_batch_size": self.rknn_batch_size,
            "auto_hybrid": self.auto_hybrid,
        })
    }

    /// Input shapes used when loading PyTorch models.
    pub fn torch_config(&self) -> Value {
        json!({ "input_size_list": self.input_size_list })
    }
}
