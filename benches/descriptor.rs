use divan::{black_box, Bencher};
use ndarray::Array2;
use sift_scale_space::{
    build_gradient_pyramid, build_gaussian_pyramid, compute_keypoint_descriptor,
    NativeProcessing, PixelBuffer, SiftKeypoint, SiftParams,
};

fn main() {
    divan::main();
}

#[divan::bench(sample_count = 1000)]
fn sift_descriptor(bencher: Bencher) {
    let img = Array2::from_shape_fn((256, 256), |(y, x)| {
        ((x as f32 * 0.13).sin() * (y as f32 * 0.07).cos() + 1.) * 0.5
    });
    let img = PixelBuffer::from_array2(img).unwrap();
    let params = SiftParams::default().with_num_octaves(1);
    let gaussian = build_gaussian_pyramid::<NativeProcessing>(&img, &params).unwrap();
    let grad = build_gradient_pyramid(&gaussian).unwrap();

    let mut kp = SiftKeypoint::template(200, 200, 0, 2);
    kp.x = 100.;
    kp.y = 100.;
    kp.sigma = 2.1;

    bencher.bench_local(|| {
        black_box(compute_keypoint_descriptor(
            &kp,
            black_box(2.15),
            &grad,
            params.lambda_desc,
        ))
    });
}
