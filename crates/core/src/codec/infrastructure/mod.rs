pub mod dpx;
pub mod film_print;
pub mod openexr;
pub mod pic;
pub mod ppm;
pub mod rla;
pub mod still_image;
