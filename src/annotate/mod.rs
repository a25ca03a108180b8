pub mod scale_bar;
