use ndarray::arr1;

use neurite::prelude::*;

fn xor_dataset() -> (Vec<Tensor>, Vec<Tensor>) {
    let inputs = vec![
        arr1(&[0.0, 0.0]).into_dyn(),
        arr1(&[0.0, 1.0]).into_dyn(),
        arr1(&[1.0, 0.0]).into_dyn(),
        arr1(&[1.0, 1.0]).into_dyn(),
    ];
    let targets = vec![
        arr1(&[0.0]).into_dyn(),
        arr1(&[1.0]).into_dyn(),
        arr1(&[1.0]).into_dyn(),
        arr1(&[0.0]).into_dyn(),
    ];
    (inputs, targets)
}

fn dataset_loss(model: &mut Sequential, inputs: &[Tensor], targets: &[Tensor]) -> f64 {
    let loss = Loss::MeanSquaredError;
    inputs
        .iter()
        .zip(targets)
        .map(|(input, target)| loss.eval(&model.predict(input), target))
        .sum::<f64>()
        / inputs.len() as f64
}

#[test]
fn train_xor() {
    let (inputs, targets) = xor_dataset();

    let mut model = Sequential::new();
    model.add(Dense::with_input(8, 2));
    model.add(ActivationLayer::new("sigmoid"));
    model.add(Dense::new(1));
    model.add(ActivationLayer::new("sigmoid"));
    model.compile("mse", Optimizer::adam(0.05, 0.9, 0.999, 1e-7));

    let before = dataset_loss(&mut model, &inputs, &targets);
    model.train(
        &inputs,
        &targets,
        TrainOptions {
            epochs: 500,
            batch_size: 4,
            ..TrainOptions::default()
        },
    );
    let after = dataset_loss(&mut model, &inputs, &targets);

    assert!(
        after < before * 0.5,
        "loss did not drop: {before} -> {after}"
    );
    assert!(model.last_error().is_finite());
}

#[test]
fn round_trip_preserves_predictions() {
    let (inputs, targets) = xor_dataset();

    let mut model = Sequential::new();
    model.add(Dense::with_input(4, 2));
    model.add(ActivationLayer::new("tanh"));
    model.add(Dense::new(1));
    model.add(ActivationLayer::new("sigmoid"));
    model.compile("mse", Optimizer::momentum(0.2, 0.9));

    model.train(
        &inputs,
        &targets,
        TrainOptions {
            epochs: 50,
            batch_size: 1,
            ..TrainOptions::default()
        },
    );

    let mut restored = Sequential::from_json(&model.to_json()).unwrap();
    for input in &inputs {
        assert_eq!(restored.predict(input), model.predict(input));
    }
}

#[test]
fn convolutional_pipeline_trains() {
    // Distinguish a vertical bar from a horizontal bar in a 1×4×4 image.
    let mut vertical = neurite::algebra::zeros(&[1, 4, 4]);
    let mut horizontal = neurite::algebra::zeros(&[1, 4, 4]);
    for i in 0..4 {
        vertical[[0, i, 1]] = 1.0;
        horizontal[[0, 1, i]] = 1.0;
    }
    let inputs = vec![vertical, horizontal];
    let targets = vec![arr1(&[0.0]).into_dyn(), arr1(&[1.0]).into_dyn()];

    let mut model = Sequential::new();
    model.add(Convolution::new(2, [3, 3]).input_shape(&[1, 4, 4]));
    model.add(ActivationLayer::new("relu"));
    model.add(MaxPooling::new([2, 2]));
    model.add(Flatten::new());
    model.add(Dense::new(1));
    model.add(ActivationLayer::new("sigmoid"));
    model.compile("mse", Optimizer::adam(0.05, 0.9, 0.999, 1e-7));

    assert_eq!(model.output_shape(), vec![1]);

    let before = dataset_loss(&mut model, &inputs, &targets);
    model.train(
        &inputs,
        &targets,
        TrainOptions {
            epochs: 200,
            batch_size: 2,
            ..TrainOptions::default()
        },
    );
    let after = dataset_loss(&mut model, &inputs, &targets);

    assert!(
        after < before,
        "loss did not drop: {before} -> {after}"
    );
}
