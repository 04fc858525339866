use affine_pool::Pool;
use std::time::Instant;

fn main() {
    let now = Instant::now();
    let pool = Pool::new(num_cpus::get());

    let handles: Vec<_> = (0..1_000_000u64)
        .map(|i| pool.submit(move || i.wrapping_mul(i)).unwrap())
        .collect();

    let mut sum = 0u64;
    for handle in handles {
        sum = sum.wrapping_add(handle.wait().unwrap());
    }

    drop(pool);
    println!("checksum: {sum}, elapsed: {:?}", now.elapsed());
}
