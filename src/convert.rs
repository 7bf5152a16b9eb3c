// 该文件是 Kanjian （看见） 项目的一部分。
// src/convert.rs - 调用外部转换程序生成中间表示模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  path::{Path, PathBuf},
  process::{Command, ExitStatus},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::MODEL_INPUT_SIZE;

/// 转换时固定的输入形状 (NHWC)
pub const INPUT_SHAPE: [usize; 4] = [1, MODEL_INPUT_SIZE as usize, MODEL_INPUT_SIZE as usize, 3];

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("无法启动转换程序 {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("转换程序异常退出 ({status}): {stderr}")]
  Failed { status: ExitStatus, stderr: String },
  #[error("转换完成但缺少输出文件: {0}")]
  MissingOutput(PathBuf),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 转换后的模型文件：描述文件与可选的独立权重文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedModel {
  pub description: PathBuf,
  pub weights: Option<PathBuf>,
}

impl ConvertedModel {
  pub fn new(description: impl Into<PathBuf>) -> Self {
    Self {
      description: description.into(),
      weights: None,
    }
  }

  pub fn with_weights(mut self, weights: impl Into<PathBuf>) -> Self {
    self.weights = Some(weights.into());
    self
  }

  fn missing_file(&self) -> Option<&Path> {
    std::iter::once(self.description.as_path())
      .chain(self.weights.as_deref())
      .find(|p| !p.is_file())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConverterProfile {
  /// OpenVINO Model Optimizer，输出 `saved_model.xml` 与 `saved_model.bin`
  #[default]
  ModelOptimizer,
  /// tf2onnx，输出内嵌权重的 `saved_model.onnx`
  Tf2Onnx,
  /// 自定义程序，参数中可使用 `{saved_model_dir}`、`{input_shape}`、
  /// `{pipeline_config}`、`{output_dir}` 占位符
  Custom {
    program: String,
    args: Vec<String>,
    description: String,
    weights: Option<String>,
  },
}

impl ConverterProfile {
  fn program(&self) -> &str {
    match self {
      ConverterProfile::ModelOptimizer => "mo",
      ConverterProfile::Tf2Onnx => "python3",
      ConverterProfile::Custom { program, .. } => program,
    }
  }

  fn args(&self, request: &ConvertRequest<'_>, input_shape: &str) -> Vec<String> {
    let saved_model_dir = request.saved_model_dir.display().to_string();
    let pipeline_config = request.pipeline_config.display().to_string();
    let output_dir = request.output_dir.display().to_string();

    match self {
      ConverterProfile::ModelOptimizer => vec![
        "--saved_model_dir".to_string(),
        saved_model_dir,
        "--input_shape".to_string(),
        input_shape.to_string(),
        "--tensorflow_object_detection_api_pipeline_config".to_string(),
        pipeline_config,
        "--output_dir".to_string(),
        output_dir,
      ],
      ConverterProfile::Tf2Onnx => vec![
        "-m".to_string(),
        "tf2onnx.convert".to_string(),
        "--saved-model".to_string(),
        saved_model_dir,
        "--inputs".to_string(),
        format!("input_tensor:0{}", input_shape),
        "--opset".to_string(),
        "13".to_string(),
        "--output".to_string(),
        self.outputs(request.output_dir).description.display().to_string(),
      ],
      ConverterProfile::Custom { args, .. } => args
        .iter()
        .map(|arg| {
          arg
            .replace("{saved_model_dir}", &saved_model_dir)
            .replace("{input_shape}", input_shape)
            .replace("{pipeline_config}", &pipeline_config)
            .replace("{output_dir}", &output_dir)
        })
        .collect(),
    }
  }

  /// 转换程序在输出目录中生成的文件
  pub fn outputs(&self, output_dir: &Path) -> ConvertedModel {
    match self {
      ConverterProfile::ModelOptimizer => ConvertedModel::new(output_dir.join("saved_model.xml"))
        .with_weights(output_dir.join("saved_model.bin")),
      ConverterProfile::Tf2Onnx => ConvertedModel::new(output_dir.join("saved_model.onnx")),
      ConverterProfile::Custom {
        description,
        weights,
        ..
      } => {
        let files = ConvertedModel::new(output_dir.join(description));
        match weights {
          Some(weights) => files.with_weights(output_dir.join(weights)),
          None => files,
        }
      }
    }
  }
}

/// 一次转换的输入与输出位置
#[derive(Debug, Clone, Copy)]
pub struct ConvertRequest<'a> {
  pub saved_model_dir: &'a Path,
  pub pipeline_config: &'a Path,
  pub output_dir: &'a Path,
}

#[derive(Debug, Clone, Default)]
pub struct Converter {
  profile: ConverterProfile,
}

impl Converter {
  pub fn new(profile: ConverterProfile) -> Self {
    Self { profile }
  }

  pub fn profile(&self) -> &ConverterProfile {
    &self.profile
  }

  /// 输出目录已存在时直接返回预期的输出文件，不再运行转换程序
  pub fn convert(&self, request: &ConvertRequest<'_>) -> Result<ConvertedModel, ConvertError> {
    let outputs = self.profile.outputs(request.output_dir);
    if request.output_dir.exists() {
      info!(
        "输出目录 {} 已存在，跳过模型转换",
        request.output_dir.display()
      );
      return Ok(outputs);
    }

    let input_shape = format_shape(&INPUT_SHAPE);
    let program = self.profile.program();
    let args = self.profile.args(request, &input_shape);
    info!("开始转换模型: {} {}", program, args.join(" "));

    std::fs::create_dir_all(request.output_dir)?;
    let now = std::time::Instant::now();
    let result = Command::new(program)
      .args(&args)
      .output()
      .map_err(|source| ConvertError::Spawn {
        program: program.to_string(),
        source,
      })
      .and_then(|output| {
        debug!("转换程序输出: {}", String::from_utf8_lossy(&output.stdout));
        if output.status.success() {
          Ok(())
        } else {
          Err(ConvertError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
          })
        }
      })
      .and_then(|()| match outputs.missing_file() {
        Some(path) => Err(ConvertError::MissingOutput(path.to_path_buf())),
        None => Ok(()),
      });

    if let Err(err) = result {
      // 转换失败时不保留输出目录
      if let Err(e) = std::fs::remove_dir_all(request.output_dir) {
        warn!("无法清理输出目录 {}: {}", request.output_dir.display(), e);
      }
      return Err(err);
    }

    info!("模型转换完成，耗时: {:.2?}", now.elapsed());
    Ok(outputs)
  }
}

fn format_shape(shape: &[usize]) -> String {
  let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
  format!("[{}]", dims.join(","))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request<'a>(root: &'a Path, output_dir: &'a Path) -> ConvertRequest<'a> {
    ConvertRequest {
      saved_model_dir: root,
      pipeline_config: root,
      output_dir,
    }
  }

  fn shell(script: &str) -> ConverterProfile {
    ConverterProfile::Custom {
      program: "sh".to_string(),
      args: vec!["-c".to_string(), script.to_string()],
      description: "model.onnx".to_string(),
      weights: None,
    }
  }

  #[test]
  fn model_optimizer_is_the_default() {
    assert_eq!(
      Converter::default().profile(),
      &ConverterProfile::ModelOptimizer
    );
  }

  #[test]
  fn input_shape_is_fixed() {
    assert_eq!(format_shape(&INPUT_SHAPE), "[1,320,320,3]");
  }

  #[test]
  fn model_optimizer_arguments() {
    let req = ConvertRequest {
      saved_model_dir: Path::new("/m/saved_model"),
      pipeline_config: Path::new("/m/pipeline.config"),
      output_dir: Path::new("/m/ir"),
    };
    let args = ConverterProfile::ModelOptimizer.args(&req, "[1,320,320,3]");
    assert_eq!(
      args,
      vec![
        "--saved_model_dir",
        "/m/saved_model",
        "--input_shape",
        "[1,320,320,3]",
        "--tensorflow_object_detection_api_pipeline_config",
        "/m/pipeline.config",
        "--output_dir",
        "/m/ir",
      ]
    );

    let files = ConverterProfile::ModelOptimizer.outputs(req.output_dir);
    assert_eq!(files.description, PathBuf::from("/m/ir/saved_model.xml"));
    assert_eq!(files.weights, Some(PathBuf::from("/m/ir/saved_model.bin")));
  }

  #[test]
  fn custom_placeholders_are_substituted() {
    let profile = ConverterProfile::Custom {
      program: "convert".to_string(),
      args: vec!["{saved_model_dir}:{input_shape}".to_string(), "{output_dir}".to_string()],
      description: "a.xml".to_string(),
      weights: Some("a.bin".to_string()),
    };
    let req = request(Path::new("/in"), Path::new("/out"));
    assert_eq!(profile.args(&req, "[1]"), vec!["/in:[1]", "/out"]);
    assert_eq!(
      profile.outputs(req.output_dir).weights,
      Some(PathBuf::from("/out/a.bin"))
    );
  }

  #[test]
  fn existing_output_directory_skips_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let converter = Converter::new(shell("exit 1"));
    let files = converter.convert(&request(dir.path(), dir.path())).unwrap();
    assert_eq!(files.description, dir.path().join("model.onnx"));
  }

  #[cfg(unix)]
  #[test]
  fn successful_conversion_returns_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ir");
    let converter = Converter::new(shell("echo model > {output_dir}/model.onnx"));
    let files = converter.convert(&request(dir.path(), &out)).unwrap();
    assert!(files.description.is_file());
  }

  #[cfg(unix)]
  #[test]
  fn failing_command_reports_stderr_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ir");
    let converter = Converter::new(shell("echo boom >&2; exit 3"));
    match converter.convert(&request(dir.path(), &out)) {
      Err(ConvertError::Failed { status, stderr }) => {
        assert_eq!(status.code(), Some(3));
        assert_eq!(stderr, "boom");
      }
      other => panic!("unexpected result: {:?}", other),
    }
    assert!(!out.exists());
  }

  #[cfg(unix)]
  #[test]
  fn missing_output_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ir");
    let converter = Converter::new(shell("true"));
    assert!(matches!(
      converter.convert(&request(dir.path(), &out)),
      Err(ConvertError::MissingOutput(_))
    ));
  }

  #[test]
  fn unknown_program_cannot_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ir");
    let converter = Converter::new(ConverterProfile::Custom {
      program: "/nonexistent/kanjian-converter".to_string(),
      args: vec![],
      description: "model.onnx".to_string(),
      weights: None,
    });
    assert!(matches!(
      converter.convert(&request(dir.path(), &out)),
      Err(ConvertError::Spawn { .. })
    ));
  }
}
