use divan::{black_box, Bencher};
use ndarray::Array2;
use sift_scale_space::{
    build_scale_space, detect_with_scale_space, ImageprocProcessing, NativeProcessing,
    PixelBuffer, SiftParams,
};

fn main() {
    divan::main();
}

/// Grid of blobs of varying size on a smooth gradient, values in [0; 255].
fn synthetic_image(size: usize) -> PixelBuffer {
    let img = Array2::from_shape_fn((size, size), |(y, x)| {
        let mut v = 40. + 60. * x as f32 / size as f32;
        for (k, (cx, cy)) in (0..6)
            .flat_map(|gy| (0..6).map(move |gx| (gx, gy)))
            .map(|(gx, gy)| ((gx * size / 6 + size / 12) as f32, (gy * size / 6 + size / 12) as f32))
            .enumerate()
        {
            let s = 2. + (k % 5) as f32;
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            v += 120. * (-d2 / (2. * s * s)).exp();
        }
        v
    });
    PixelBuffer::from_array2(img).unwrap()
}

#[divan::bench(args = [256, 512])]
fn sift_native(bencher: Bencher, size: usize) {
    let img = synthetic_image(size);
    let params = SiftParams::default();
    bencher.bench_local(|| black_box(sift_scale_space::sift_with_params(&img, &params)));
}

#[divan::bench]
fn sift_imageproc(bencher: Bencher) {
    let img = synthetic_image(256);
    let params = SiftParams::default();
    bencher.bench_local(|| {
        black_box(sift_scale_space::sift_with_processing::<ImageprocProcessing>(
            &img, &params,
        ))
    });
}

#[divan::bench]
fn scale_space_only(bencher: Bencher) {
    let img = synthetic_image(256);
    let params = SiftParams::default();
    bencher.bench_local(|| black_box(build_scale_space::<NativeProcessing>(&img, &params)));
}

#[divan::bench]
fn detect_only(bencher: Bencher) {
    let img = synthetic_image(256);
    let params = SiftParams::default();
    let scale_space = build_scale_space::<NativeProcessing>(&img, &params).unwrap();
    bencher.bench_local(|| black_box(detect_with_scale_space(&scale_space, &params)));
}
