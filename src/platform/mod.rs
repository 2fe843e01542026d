pub mod gpio_rotary;
