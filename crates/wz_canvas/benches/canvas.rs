use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn get_input() -> wz_canvas::Bitmap {
    let (width, height) = (512u32, 512u32);
    let mut bitmap = wz_canvas::Bitmap::filled(width, height, [0, 0, 0, 0]);
    for y in 0..height {
        for x in 0..width {
            bitmap.set_pixel(x, y, [x as u8, y as u8, (x ^ y) as u8, (x + y) as u8]);
        }
    }
    bitmap
}

pub mod dxt {
    use divan::Bencher;
    use wz_canvas::dxt::{self, BlockAlpha};

    #[divan::bench(args = [false, true])]
    fn decode_dxt5(bencher: Bencher, parallel: bool) {
        let data = dxt::encode(&super::get_input(), BlockAlpha::Interpolated, false);
        bencher.bench_local(move || {
            divan::black_box(dxt::decode(&data, 512, 512, BlockAlpha::Interpolated, parallel));
        });
    }

    #[divan::bench(args = [false, true])]
    fn encode_dxt3(bencher: Bencher, parallel: bool) {
        let bitmap = super::get_input();
        bencher.bench_local(move || {
            divan::black_box(dxt::encode(&bitmap, BlockAlpha::Explicit, parallel));
        });
    }
}

pub mod select {
    use divan::Bencher;
    use wz_canvas::{select::BitmapAnalysis, CodecOptions};

    #[divan::bench]
    fn analyse(bencher: Bencher) {
        let bitmap = super::get_input();
        bencher.bench_local(move || {
            divan::black_box(BitmapAnalysis::of(&bitmap).select(&CodecOptions::default()));
        });
    }
}
