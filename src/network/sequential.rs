//! The model orchestrator: an ordered layer stack with shape wiring,
//! batched gradient training, evolutionary mutation and persistence.

use rand::Rng;
use serde_json::{json, Value};

use crate::algebra::{self, Tensor};
use crate::derivable::loss::Loss;
use crate::layer::{self, Layer};
use crate::optimizer::{Optimizer, OptimizerRecord};
use crate::utils::shuffle_pairs;

/// Knobs for [`Sequential::train`].
///
/// A `batch_size` of zero means "the whole dataset". `log_epochs` prints
/// the running error every that many epochs; zero keeps training silent.
#[derive(Clone, Copy, Debug)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub log_epochs: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            shuffle: false,
            log_epochs: 0,
        }
    }
}

/// An ordered stack of layers trained against a named loss with a shared
/// optimizer.
///
/// Layers are appended with [`Sequential::add`], which wires each new
/// layer's input shape to its predecessor's output shape. The trainable
/// subset is tracked by index so updates and mutations can address it
/// directly.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    trainable: Vec<usize>,
    loss_name: String,
    loss: Loss,
    optimizer: Optimizer,
    /// Monotonic batch counter, used as the optimizer's iteration index.
    batch: usize,
    batch_size: usize,
    parameters: usize,
    error: f64,
}

impl Sequential {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            trainable: Vec::new(),
            loss_name: "mse".to_string(),
            loss: Loss::from_name("mse"),
            optimizer: Optimizer::sgd(0.1),
            batch: 0,
            batch_size: 0,
            parameters: 0,
            error: 1.0,
        }
    }

    /// Appends a layer, resizing it to the previous layer's output shape.
    pub fn add(&mut self, layer: impl Layer + 'static) {
        self.add_boxed(Box::new(layer), false);
    }

    /// Appends an already-shaped layer without resizing it. Used when
    /// reconstructing a persisted model, whose layers carry final shapes;
    /// resizing would re-randomize their restored parameters.
    pub fn add_restored(&mut self, layer: Box<dyn Layer>) {
        self.add_boxed(layer, true);
    }

    fn add_boxed(&mut self, mut layer: Box<dyn Layer>, restored: bool) {
        if !restored {
            if let Some(previous) = self.layers.last() {
                layer.resize(&previous.output_shape());
            }
        }
        if let Some(trainable) = layer.as_trainable_mut() {
            self.parameters += trainable.parameter_count();
            self.trainable.push(self.layers.len());
        }
        self.layers.push(layer);
    }

    /// Selects the loss and the optimizer. Unknown loss names resolve to
    /// mean squared error.
    pub fn compile(&mut self, loss: &str, optimizer: Optimizer) {
        self.set_loss(loss);
        self.optimizer = optimizer;
    }

    pub fn set_loss(&mut self, name: &str) {
        self.loss_name = name.to_string();
        self.loss = Loss::from_name(name);
    }

    pub fn output_shape(&self) -> Vec<usize> {
        self.layers
            .last()
            .map(|layer| layer.output_shape())
            .unwrap_or_default()
    }

    /// Total parameter count across the trainable layers.
    pub fn parameter_count(&self) -> usize {
        self.parameters
    }

    /// Mean per-sample loss of the most recent training batch.
    pub fn last_error(&self) -> f64 {
        self.error
    }

    pub fn predict_on_batch(&mut self, input: &[Tensor]) -> Vec<Tensor> {
        let mut output = input.to_vec();
        for layer in &mut self.layers {
            output = layer.forward(&output);
        }
        output
    }

    pub fn predict(&mut self, input: &Tensor) -> Tensor {
        self.predict_on_batch(std::slice::from_ref(input)).remove(0)
    }

    /// One full gradient step on a single batch: forward, per-sample loss
    /// gradients, backward accumulation, then a parameter update with the
    /// incremented batch counter as the optimizer's iteration index.
    pub fn train_on_batch(&mut self, inputs: &[Tensor], targets: &[Tensor]) -> f64 {
        let batch_size = inputs.len();
        if self.batch_size == 0 {
            self.batch_size = batch_size;
        }

        let output = self.predict_on_batch(inputs);

        let mut error = 0.0;
        let mut gradient: Vec<Tensor> = Vec::with_capacity(batch_size);
        for (prediction, target) in output.iter().zip(targets) {
            error += self.loss.eval(prediction, target);
            gradient.push(self.loss.nabla(prediction, target));
        }

        for layer in self.layers.iter_mut().rev() {
            gradient = layer.backward(&gradient);
        }

        self.batch += 1;
        self.error = algebra::safe_div_value(error, batch_size as f64);
        self.update(self.batch);
        self.error
    }

    /// Asks every trainable layer to consult the optimizer and mutate its
    /// parameters, then reset its gradient accumulators.
    pub fn update(&mut self, index: usize) {
        let (optimizer, batch_size) = (self.optimizer.clone(), self.batch_size);
        for &i in &self.trainable {
            if let Some(trainable) = self.layers[i].as_trainable_mut() {
                trainable.update(&optimizer, batch_size, index);
            }
        }
    }

    /// Repeats [`Sequential::train_on_batch`] over successive
    /// non-overlapping slices of the dataset for the requested number of
    /// epochs.
    pub fn train(&mut self, inputs: &[Tensor], targets: &[Tensor], options: TrainOptions) {
        self.batch_size = if options.batch_size == 0 {
            inputs.len()
        } else {
            options.batch_size
        };

        let mut rng = rand::thread_rng();
        for epoch in 0..options.epochs {
            for (batch_inputs, batch_targets) in inputs
                .chunks(self.batch_size)
                .zip(targets.chunks(self.batch_size))
            {
                if options.shuffle {
                    let mut batch_inputs = batch_inputs.to_vec();
                    let mut batch_targets = batch_targets.to_vec();
                    shuffle_pairs(&mut batch_inputs, &mut batch_targets, &mut rng);
                    self.train_on_batch(&batch_inputs, &batch_targets);
                } else {
                    self.train_on_batch(batch_inputs, batch_targets);
                }
            }

            if options.log_epochs != 0 && epoch % options.log_epochs == 0 {
                println!("Epoch {epoch}, error: {:.4}", self.error);
            }
        }

        // Counter overflow check against the original call's sizes; see
        // `batch` field. Stale by one comparison on purpose.
        if self.batch as f64 > inputs.len() as f64 / self.batch_size as f64 {
            self.batch = 0;
        }
    }

    /// Perturbs every trainable layer: each weight entry is replaced, with
    /// probability `mutation_rate`, by a uniform draw from
    /// `[-mutation, mutation]`. Orthogonal to gradient training.
    pub fn mutate(&mut self, mutate_bias: bool, mutation_rate: f64, mutation: f64) {
        let range = [-mutation, mutation];
        for &i in &self.trainable {
            if let Some(trainable) = self.layers[i].as_trainable_mut() {
                trainable.mutate_weights(mutation_rate, range);
                if mutate_bias {
                    trainable.mutate_bias(mutation_rate, range);
                }
            }
        }
    }

    /// Same as [`Sequential::mutate`], but for a single randomly chosen
    /// trainable layer.
    pub fn mutate_random_layer(&mut self, mutate_bias: bool, mutation_rate: f64, mutation: f64) {
        if self.trainable.is_empty() {
            return;
        }
        let choice = rand::thread_rng().gen_range(0..self.trainable.len());
        let index = self.trainable[choice];

        let range = [-mutation, mutation];
        if let Some(trainable) = self.layers[index].as_trainable_mut() {
            trainable.mutate_weights(mutation_rate, range);
            if mutate_bias {
                trainable.mutate_bias(mutation_rate, range);
            }
        }
    }

    /// The persisted model record: loss name, optimizer record and ordered
    /// per-layer records.
    pub fn save(&self) -> Value {
        let layers: Vec<Value> = self.layers.iter().map(|layer| layer.save()).collect();
        json!({
            "loss": self.loss_name,
            "optimizer": self.optimizer.record(),
            "layers": layers,
        })
    }

    pub fn to_json(&self) -> String {
        self.save().to_string()
    }

    /// Reconstructs a model from its persisted record. Layer records carry
    /// final shapes, so shape wiring is suppressed; unknown loss, optimizer
    /// and layer names resolve to their documented defaults.
    pub fn load(record: &Value) -> Self {
        let mut model = Self::new();

        if let Some(layers) = record.get("layers").and_then(Value::as_array) {
            for layer_record in layers {
                model.add_restored(layer::from_record(layer_record));
            }
        }

        let optimizer = record
            .get("optimizer")
            .and_then(|v| serde_json::from_value::<OptimizerRecord>(v.clone()).ok())
            .map(|record| Optimizer::from_record(&record))
            .unwrap_or_else(|| Optimizer::sgd(0.1));
        let loss = record
            .get("loss")
            .and_then(Value::as_str)
            .unwrap_or("mse")
            .to_string();
        model.compile(&loss, optimizer);

        model
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::load(&serde_json::from_str(json)?))
    }

    /// A deep copy through the persisted format.
    pub fn copy(&self) -> Self {
        Self::load(&self.save())
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}
