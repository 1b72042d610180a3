fn main() {
    slint_build::compile("ui/main-window.slint").expect("Slint build failed");
}
