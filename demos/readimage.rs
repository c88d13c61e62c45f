extern crate viewfmt;

use std::env;
use std::path::Path;
use viewfmt::{ImageFormat, Progress, Registry};

fn main() {
    if env::args().count() != 2 {
        println!("Usage: readimage <path>");
        return;
    }
    let path = env::args().nth(1).unwrap();
    let path = Path::new(&path);
    let mut registry = Registry::new();
    let first = registry.load(path, 0, &mut Progress::none())
                        .expect("failed to read image");
    let format = registry.active().map(|format| format.name()).unwrap_or("?");
    println!("{} file contains {} image(s).", format, first.count());
    for index in 0..first.count() {
        let bitmap = match registry.load_sub_image(index, &mut Progress::none()) {
            Ok(bitmap) => bitmap,
            Err(err) => {
                println!("Image {}: {}", index, err);
                continue;
            }
        };
        println!("Image {}: {}x{} {:?}, pitch {}, {} bpp ({} bpp in file){}",
                 index,
                 bitmap.width(),
                 bitmap.height(),
                 bitmap.layout(),
                 bitmap.pitch(),
                 bitmap.bpp(),
                 bitmap.bpp_image(),
                 if bitmap.icc_profile().is_some() { ", ICC profile" } else { "" });
    }
}
