//! End-to-end preprocessing tests on a generated dataset tree

use car_dataset::{
    CanvasSize, DatasetError, KeyColorRemover, PreprocessConfig, Preprocessor, ProcessedLog,
};
use image::{Rgb, RgbImage};
use std::path::Path;
use tempfile::TempDir;

/// A red box on a light studio backdrop
fn write_studio_shot(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to create category dir");
    let mut img = RgbImage::from_pixel(width, height, Rgb([245, 245, 245]));
    for y in height / 3..2 * height / 3 {
        for x in width / 5..4 * width / 5 {
            img.put_pixel(x, y, Rgb([190, 25, 25]));
        }
    }
    img.save(path).expect("Failed to write test image");
}

fn config(root: &Path) -> PreprocessConfig {
    PreprocessConfig::builder()
        .input_dir(root.join("data"))
        .output_dir(root.join("preprocessed data"))
        .log_path(root.join("processed_images.log"))
        .build()
        .expect("Failed to build config")
}

#[test]
fn test_dataset_is_mirrored_onto_default_canvas() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    write_studio_shot(&temp.path().join("data/BMW i8/img_1.jpg"), 300, 200);
    write_studio_shot(&temp.path().join("data/Tesla Model S/img_2.jpg"), 160, 240);
    write_studio_shot(&temp.path().join("data/Tesla Model S/img_3.png"), 160, 240);

    let report = Preprocessor::new(config(temp.path()), Box::new(KeyColorRemover::default()))
        .expect("Failed to create preprocessor")
        .run()
        .expect("Preprocessing failed");

    assert_eq!(report.discovered, 2);
    assert_eq!(report.processed, 2);
    assert!(report.failed.is_empty());

    let canvas = CanvasSize::default();
    for relative in ["BMW i8/img_1.jpg", "Tesla Model S/img_2.jpg"] {
        let out = image::open(temp.path().join("preprocessed data").join(relative))
            .expect("Output missing");
        assert_eq!((out.width(), out.height()), (canvas.width, canvas.height));

        // corners stay black background
        let rgb = out.to_rgb8();
        let corner = rgb.get_pixel(0, 0);
        assert!(corner.0.iter().all(|&c| c < 16), "{relative}: {corner:?}");
    }
    assert!(!temp.path().join("preprocessed data/Tesla Model S/img_3.png").exists());
}

#[test]
fn test_rerun_is_idempotent_and_retries_failures() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    write_studio_shot(&temp.path().join("data/Audi R8/img_1.jpg"), 200, 100);
    let broken = temp.path().join("data/Audi R8/img_2.jpg");
    std::fs::write(&broken, b"truncated").unwrap();

    let preprocessor =
        Preprocessor::new(config(temp.path()), Box::new(KeyColorRemover::default()))
            .expect("Failed to create preprocessor");

    let first = preprocessor.run().expect("First run failed");
    assert_eq!(first.processed, 1);
    assert_eq!(first.failed.len(), 1);

    let second = preprocessor.run().expect("Second run failed");
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.failed.len(), 1, "broken file is retried");

    let log = ProcessedLog::open(temp.path().join("processed_images.log")).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log.contains("img_1.jpg"));
    assert!(!log.contains("img_2.jpg"));
    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[test]
fn test_blank_image_is_reported_as_empty_subject() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let blank = temp.path().join("data/Ford GT/img_1.jpg");
    std::fs::create_dir_all(blank.parent().unwrap()).unwrap();
    RgbImage::from_pixel(64, 64, Rgb([250, 250, 250]))
        .save(&blank)
        .unwrap();

    let preprocessor =
        Preprocessor::new(config(temp.path()), Box::new(KeyColorRemover::default()))
            .expect("Failed to create preprocessor");

    let err = preprocessor.process_file(&blank).unwrap_err();
    assert!(matches!(err, DatasetError::EmptySubject(_)), "{err}");

    let report = preprocessor.run().expect("Preprocessing failed");
    assert_eq!(report.failed.len(), 1);
    assert!(!temp.path().join("preprocessed data/Ford GT/img_1.jpg").exists());
}

#[test]
fn test_preserve_hierarchy_keeps_nested_paths() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    write_studio_shot(&temp.path().join("data/2024/Porsche 911/img_1.jpg"), 120, 90);

    let config = PreprocessConfig {
        preserve_hierarchy: true,
        ..config(temp.path())
    };
    Preprocessor::new(config, Box::new(KeyColorRemover::default()))
        .expect("Failed to create preprocessor")
        .run()
        .expect("Preprocessing failed");

    assert!(temp
        .path()
        .join("preprocessed data/2024/Porsche 911/img_1.jpg")
        .exists());
}
