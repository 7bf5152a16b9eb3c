// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 使用模拟模型的端到端流程测试
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

use std::{cell::RefCell, rc::Rc};

use kanjian::{
  detector::{Detection, Detector},
  frame::{ChannelOrder, Image, PreprocessedTensor},
  label::LabelMap,
  model::{DetectionSet, Model},
  output::Render,
  task::{CompareTask, OneShotTask, Task},
};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("模拟推理失败")]
struct MockError;

/// 返回固定输出的模型，同时检查输入形状
struct FixedModel {
  output: Option<DetectionSet>,
}

impl Model for FixedModel {
  type Input = PreprocessedTensor;
  type Output = DetectionSet;
  type Error = MockError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    assert_eq!(input.shape(), [1, 320, 320, 3]);
    self.output.clone().ok_or(MockError)
  }
}

#[derive(Clone, Default)]
struct Recorder {
  rendered: Rc<RefCell<Vec<(u32, u32, Vec<Detection>)>>>,
}

impl Render<Image, Vec<Detection>> for Recorder {
  type Error = MockError;

  fn render_result(&self, frame: &Image, result: &Vec<Detection>) -> Result<(), Self::Error> {
    self
      .rendered
      .borrow_mut()
      .push((frame.width(), frame.height(), result.clone()));
    Ok(())
  }
}

fn labels() -> LabelMap {
  LabelMap::from_json_str(r#"{"1": "person", "3": "bicycle"}"#).unwrap()
}

fn image(width: u32, height: u32) -> Image {
  Image::from_raw(
    width,
    height,
    vec![127; (width * height * 3) as usize],
    ChannelOrder::Bgr,
  )
  .unwrap()
}

fn bicycle() -> DetectionSet {
  DetectionSet::new(vec![[0.1, 0.2, 0.5, 0.6]], vec![3.0], vec![0.9], 1.0).unwrap()
}

#[test]
fn one_shot_detects_single_bicycle() {
  let recorder = Recorder::default();
  let task: OneShotTask = OneShotTask::new(Detector::new(0.5).unwrap(), labels());
  let detections = task
    .run_task(
      std::iter::once(image(400, 400)),
      FixedModel {
        output: Some(bicycle()),
      },
      recorder.clone(),
    )
    .unwrap();

  let expected = vec![Detection {
    xmin: 80,
    ymin: 40,
    xmax: 240,
    ymax: 200,
    class_id: 3,
    label: "bicycle".to_string(),
    score: 0.9,
  }];
  assert_eq!(detections, expected);
  assert_eq!(*recorder.rendered.borrow(), vec![(400, 400, expected)]);
}

#[test]
fn empty_input_is_an_error() {
  let recorder = Recorder::default();
  let task: OneShotTask = OneShotTask::new(Detector::new(0.5).unwrap(), labels());
  let result = task.run_task(
    std::iter::empty(),
    FixedModel {
      output: Some(bicycle()),
    },
    recorder.clone(),
  );
  assert!(result.is_err());
  assert!(recorder.rendered.borrow().is_empty());
}

#[test]
fn failed_inference_renders_nothing() {
  let recorder = Recorder::default();
  let task: OneShotTask = OneShotTask::new(Detector::new(0.5).unwrap(), labels());
  let result = task.run_task(
    std::iter::once(image(64, 48)),
    FixedModel { output: None },
    recorder.clone(),
  );
  assert!(result.is_err());
  assert!(recorder.rendered.borrow().is_empty());
}

#[test]
fn compare_reports_backend_differences() {
  let native_out = Recorder::default();
  let compiled_out = Recorder::default();
  let mut shifted = bicycle();
  shifted.scores[0] = 0.7;
  shifted.boxes[0][3] = 0.7;

  let task: CompareTask = CompareTask::new(Detector::new(0.5).unwrap(), labels());
  let comparison = task
    .run_task(
      std::iter::once(image(400, 400)),
      (
        FixedModel {
          output: Some(bicycle()),
        },
        FixedModel {
          output: Some(shifted),
        },
      ),
      (native_out.clone(), compiled_out.clone()),
    )
    .unwrap();

  assert_eq!(comparison.compared_slots, 1);
  assert!((comparison.max_score_delta - 0.2).abs() < 1e-6);
  assert!((comparison.max_box_delta - 0.1).abs() < 1e-6);
  assert!(!comparison.is_within(1e-3));

  let native = native_out.rendered.borrow();
  let compiled = compiled_out.rendered.borrow();
  assert_eq!(native[0].2[0].xmax, 240);
  assert_eq!(compiled[0].2[0].xmax, 280);
}

#[test]
fn compare_identical_backends_is_within_tolerance() {
  let task: CompareTask = CompareTask::new(Detector::new(0.5).unwrap(), labels());
  let comparison = task
    .run_task(
      std::iter::once(image(32, 32)),
      (
        FixedModel {
          output: Some(bicycle()),
        },
        FixedModel {
          output: Some(bicycle()),
        },
      ),
      (Recorder::default(), Recorder::default()),
    )
    .unwrap();
  assert!(comparison.is_within(0.0));
}

#[cfg(feature = "save_image_file")]
#[test]
fn image_file_round_trip_through_outputs() {
  use kanjian::{FromUrl, input::ImageFileInput, output::OutputWrapper};
  use url::Url;

  let dir = tempfile::tempdir().unwrap();
  let input_path = dir.path().join("input.png");
  image::RgbImage::from_pixel(400, 300, image::Rgb([10, 20, 30]))
    .save(&input_path)
    .unwrap();
  let output_path = dir.path().join("out").join("result.png");

  let input =
    ImageFileInput::from_url(&Url::parse(&format!("image://{}", input_path.display())).unwrap())
      .unwrap();
  let output =
    OutputWrapper::from_url(&Url::parse(&format!("image://{}", output_path.display())).unwrap())
      .unwrap();

  let task: OneShotTask = OneShotTask::new(Detector::new(0.5).unwrap(), labels());
  task
    .run_task(
      input,
      FixedModel {
        output: Some(bicycle()),
      },
      output,
    )
    .unwrap();

  let saved = image::open(&output_path).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (800, 300));
  // 右侧原图保持不变
  assert_eq!(saved.get_pixel(400 + 200, 150), &image::Rgb([10, 20, 30]));
}
