use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use edgelight::{
    image::*,
    models::{ZoneConfiguration, ZoneLayout},
};

fn random_frame(width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; (width * height * PixelFormat::BYTES_PER_PIXEL) as usize];
    data.iter_mut().for_each(|byte| *byte = rand::random());

    Frame::new(data, width, height, PixelFormat::Bgra8).unwrap()
}

fn zone_layout(zones: u32) -> ZoneLayout {
    ZoneLayout::new(&ZoneConfiguration {
        top_zone_count: zones / 4,
        bottom_zone_count: zones / 4,
        left_zone_count: zones / 4,
        right_zone_count: zones / 4,
        ..Default::default()
    })
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let (width, height) = (1920, 1080);
    let frame = random_frame(width, height);
    let layout = zone_layout(40);

    c.bench_function(
        &format!("{} px {} zones", width * height, layout.zone_count()),
        |b| b.iter(|| ZoneColorExtractor::sample_zones(black_box(&frame), layout.zones(), width, height)),
    );

    c.bench_function(&format!("{} px histogram", width * height), |b| {
        b.iter(|| ColorAlgorithm.predominant_color(&Histogram::from_frame(black_box(&frame))))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
