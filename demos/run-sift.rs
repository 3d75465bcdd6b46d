//! Run sift on an image file and print a summary of the keypoints.

use sift_scale_space::{PixelBuffer, SiftParams};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: run-sift <image> [max keypoints]");
        return;
    };
    let img = match image::open(path) {
        Ok(img) => img.to_rgb8(),
        Err(err) => {
            eprintln!("could not open {path}: {err}");
            return;
        }
    };
    let max_keypoints = args.get(2).and_then(|n| n.parse().ok());
    let params = SiftParams::default().with_max_keypoints(max_keypoints);

    let keypoints = PixelBuffer::from_rgb_image(&img)
        .and_then(|img| sift_scale_space::sift_with_params(&img, &params));
    match keypoints {
        Ok(keypoints) => {
            println!("{} keypoints", keypoints.len());
            for kp in keypoints.iter().take(10) {
                println!(
                    "x={:.2} y={:.2} sigma={:.2} orientation={:.1}°",
                    kp.x,
                    kp.y,
                    kp.sigma,
                    kp.orientation.to_degrees()
                );
            }
        }
        Err(err) => eprintln!("sift failed: {err}"),
    }
}
